// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::Deserialize;
use serde_aco::Help;

pub const GLOBAL_BLOCK_CLASS: &str = "__NSConcreteGlobalBlock";
pub const STACK_BLOCK_CLASS: &str = "__NSConcreteStackBlock";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Help)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of worker threads of a sweep. [default: 1]
    pub jobs: usize,
    /// Type the invoke, copy and dispose functions. [default: on]
    pub functions: bool,
    /// Recover the byref cells captured by stack blocks. [default: on]
    pub byrefs: bool,
    /// Symbol of the class of global blocks. [default: __NSConcreteGlobalBlock]
    pub global_class: String,
    /// Symbol of the class of stack blocks. [default: __NSConcreteStackBlock]
    pub stack_class: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            jobs: 1,
            functions: true,
            byrefs: true,
            global_class: GLOBAL_BLOCK_CLASS.to_owned(),
            stack_class: STACK_BLOCK_CLASS.to_owned(),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

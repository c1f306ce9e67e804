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

use rstest::rstest;

use crate::config::AnalysisConfig;

#[rstest]
#[case("jobs=1", AnalysisConfig::default())]
#[case("jobs=8,byrefs=off", AnalysisConfig { jobs: 8, byrefs: false, ..Default::default() })]
#[case(
    "functions=false,stack_class=_NSConcreteStackBlock",
    AnalysisConfig {
        functions: false,
        stack_class: "_NSConcreteStackBlock".to_owned(),
        ..Default::default()
    }
)]
#[case("jobs=0x10", AnalysisConfig { jobs: 16, ..Default::default() })]
fn test_parse(#[case] arg: &str, #[case] expected: AnalysisConfig) {
    assert_eq!(serde_aco::from_arg::<AnalysisConfig>(arg).unwrap(), expected);
}

#[rstest]
#[case("jobs=many")]
#[case("byrefs=maybe")]
fn test_parse_invalid(#[case] arg: &str) {
    assert!(serde_aco::from_arg::<AnalysisConfig>(arg).is_err());
}

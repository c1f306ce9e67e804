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

//! Finds block instances and annotates them on a pool of workers.

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use log::{info, warn};
use snafu::{ResultExt, Snafu};

use crate::annotate::{self, Annotator, BlockAnnotation};
use crate::decode::BlockKind;
use crate::errors::{DebugTrace, trace_error};
use crate::host::{Host, SymbolKind};

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, visibility(pub), context(suffix(false)))]
pub enum Error {
    #[snafu(display("{name} not found, target does not appear to contain {kind} blocks"))]
    MissingClass { name: String, kind: BlockKind },
    #[snafu(display("Failed to spawn sweep worker {index}"))]
    SpawnWorker { index: usize, error: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Stops a sweep from starting new instances.
#[derive(Debug, Default)]
pub struct Cancel(AtomicBool);

impl Cancel {
    pub fn new() -> Self {
        Cancel::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A place a block instance was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// Data address of a global literal.
    Global(u64),
    /// An instruction storing the stack block class. `function` and `insn`
    /// index into [`Host::il_functions`].
    Stack {
        address: u64,
        function: usize,
        insn: usize,
    },
}

impl Candidate {
    pub fn address(&self) -> u64 {
        match self {
            Candidate::Global(address) | Candidate::Stack { address, .. } => *address,
        }
    }
}

impl Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Global(address) => write!(f, "global block {address:x}"),
            Candidate::Stack { address, .. } => write!(f, "stack block {address:x}"),
        }
    }
}

#[derive(Debug)]
pub struct Outcome {
    pub candidate: Candidate,
    pub result: annotate::Result<BlockAnnotation>,
}

/// Data references to the global block class.
pub fn global_candidates<H>(annotator: &Annotator<'_, H>) -> Result<Vec<Candidate>>
where
    H: Host,
{
    let name = &annotator.config().global_class;
    let host = annotator.host();
    let Some(class) = host.symbol(name, SymbolKind::External) else {
        return error::MissingClass {
            name,
            kind: BlockKind::Global,
        }
        .fail();
    };
    let candidates = host
        .data_refs(class.addr)
        .into_iter()
        .map(Candidate::Global)
        .collect::<Vec<_>>();
    info!("{name}: {} data references", candidates.len());
    Ok(candidates)
}

/// Stores whose right-hand side loads the stack block class.
pub fn stack_candidates<H>(annotator: &Annotator<'_, H>) -> Vec<Candidate>
where
    H: Host,
{
    let marker = annotator.stack_marker();
    let mut candidates = Vec::new();
    for (function, f) in annotator.host().il_functions().iter().enumerate() {
        for (insn, i) in f.insns.iter().enumerate() {
            let Some((_, src)) = i.store() else {
                continue;
            };
            if marker.resolve(src).is_some() {
                candidates.push(Candidate::Stack {
                    address: i.addr,
                    function,
                    insn,
                });
            }
        }
    }
    info!("{}: {} stores", marker.name, candidates.len());
    candidates
}

fn annotate_one<H>(annotator: &Annotator<'_, H>, candidate: Candidate) -> Outcome
where
    H: Host,
{
    let result = match candidate {
        Candidate::Global(address) => annotator.annotate_global(address),
        Candidate::Stack {
            address,
            function,
            insn,
        } => {
            let functions = annotator.host().il_functions();
            let found = functions
                .get(function)
                .and_then(|f| f.insns.get(insn).map(|i| (f, i)));
            match found {
                Some((f, i)) => annotator.annotate_stack(f, i),
                None => annotate::error::NoInstruction { address }.fail(),
            }
        }
    };
    if let Err(e) = &result {
        warn!("{candidate}: {e:?}");
    }
    Outcome { candidate, result }
}

/// Annotates `candidates` on `jobs` workers. Outcomes come back in the
/// order of `candidates`; instances skipped after `cancel` have none.
pub fn run<H>(
    annotator: &Annotator<'_, H>,
    candidates: &[Candidate],
    cancel: &Cancel,
) -> Result<Vec<Outcome>>
where
    H: Host + Sync,
{
    let jobs = annotator.config().jobs.clamp(1, candidates.len().max(1));
    let next = AtomicUsize::new(0);
    let failed_spawn = AtomicBool::new(false);
    let worker = || {
        let mut done = Vec::new();
        while !cancel.is_cancelled() && !failed_spawn.load(Ordering::Acquire) {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(candidate) = candidates.get(index) else {
                break;
            };
            done.push((index, annotate_one(annotator, *candidate)));
        }
        done
    };

    let mut indexed = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(jobs);
        for index in 0..jobs {
            let handle = thread::Builder::new()
                .name(format!("sweep_{index}"))
                .spawn_scoped(scope, worker);
            match handle {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    failed_spawn.store(true, Ordering::Release);
                    return Err(e).context(error::SpawnWorker { index });
                }
            }
        }
        let mut indexed = Vec::with_capacity(candidates.len());
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(done) => indexed.extend(done),
                Err(e) => log::error!("cannot join sweep worker {index}: {e:?}"),
            }
        }
        Ok(indexed)
    })?;
    indexed.sort_by_key(|(index, _)| *index);

    let outcomes = indexed.into_iter().map(|(_, o)| o).collect::<Vec<_>>();
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        "Annotated {} of {} blocks, {failed} failed",
        outcomes.len() - failed,
        candidates.len()
    );
    Ok(outcomes)
}

/// Annotates every global and stack block the host knows about. A
/// missing global block class only skips the global sweep.
pub fn sweep<H>(annotator: &Annotator<'_, H>, cancel: &Cancel) -> Result<Vec<Outcome>>
where
    H: Host + Sync,
{
    let mut candidates = match global_candidates(annotator) {
        Ok(candidates) => candidates,
        Err(e) => {
            info!("{e}");
            Vec::new()
        }
    };
    candidates.extend(stack_candidates(annotator));
    run(annotator, &candidates, cancel)
}

#[cfg(test)]
#[path = "sweep_test.rs"]
mod tests;

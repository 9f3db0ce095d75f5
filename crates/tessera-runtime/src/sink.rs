// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Operator-visible progress reporting.

use std::path::PathBuf;
use tessera_core::{JobOutcome, PatchCoord};

/// The final tally of a run, reported once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of patches in the grid.
    pub total: usize,
    /// Number of outcomes reported before the decision became final.
    pub reported: usize,
    /// Number of patches that succeeded.
    pub succeeded: usize,
    /// The failure that decided the run, if any.
    pub first_failure: Option<JobOutcome>,
    /// Where the composite was written, on success.
    pub composite: Option<PathBuf>,
}

impl RunSummary {
    /// Whether every patch succeeded and the composite was written.
    pub fn is_success(&self) -> bool {
        self.first_failure.is_none() && self.composite.is_some()
    }
}

/// Receives per-patch progress as it happens.
///
/// Calls arrive concurrently from every running supervisor; lines of one
/// patch arrive in the order its process wrote them.
pub trait ProgressSink: Send + Sync {
    /// A patch was admitted and its process is about to start.
    fn launched(&self, coord: PatchCoord);

    /// A patch's process wrote one line of output.
    fn line(&self, coord: PatchCoord, line: &str);

    /// A patch's outcome was accepted by the failure aggregator.
    fn finished(&self, outcome: &JobOutcome);

    /// The run is over.
    fn summary(&self, summary: &RunSummary);
}

/// Routes progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn launched(&self, coord: PatchCoord) {
        log::info!("Patch {coord}: launching");
    }

    fn line(&self, coord: PatchCoord, line: &str) {
        log::info!("Patch {coord}: {line}");
    }

    fn finished(&self, outcome: &JobOutcome) {
        if outcome.is_success() {
            log::info!("{outcome}");
        } else {
            log::error!("{outcome}");
        }
    }

    fn summary(&self, summary: &RunSummary) {
        match (&summary.first_failure, &summary.composite) {
            (None, Some(path)) => log::info!(
                "All {} patches rendered; composite written to '{}'",
                summary.total,
                path.display()
            ),
            (Some(failure), _) => log::error!(
                "Run failed: {failure}; {} of {} patches succeeded",
                summary.succeeded,
                summary.total
            ),
            (None, None) => log::error!("Run ended without a composite"),
        }
    }
}

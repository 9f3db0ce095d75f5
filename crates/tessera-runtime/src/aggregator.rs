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

//! Turns a stream of completions into the run's pass/fail decision.

use crate::cancel::CancellationController;
use crate::context::RunContext;
use crate::sink::ProgressSink;
use std::sync::Arc;
use tessera_core::JobOutcome;

/// The decision reached by a [`FailureAggregator`].
#[derive(Debug, Clone, Default)]
pub struct Verdict {
    /// Every outcome, in completion order.
    pub outcomes: Vec<JobOutcome>,
    /// How many outcomes were reported before the decision became final.
    pub reported: usize,
    /// The first failure observed, if any.
    pub first_failure: Option<JobOutcome>,
}

impl Verdict {
    /// Whether every job succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.first_failure.is_none() && self.outcomes.iter().all(JobOutcome::is_success)
    }

    /// Number of successful outcomes.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }
}

/// Consumes outcomes one at a time and cancels the run on the first failure.
pub struct FailureAggregator {
    ctx: Arc<RunContext>,
    canceller: Arc<CancellationController>,
    sink: Arc<dyn ProgressSink>,
}

impl FailureAggregator {
    /// Creates an aggregator reporting to `sink`.
    pub fn new(
        ctx: Arc<RunContext>,
        canceller: Arc<CancellationController>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            ctx,
            canceller,
            sink,
        }
    }

    /// Drains `completions` to the end.
    ///
    /// Outcomes are reported until the first failure. Once the decision is
    /// final the remaining outcomes are still collected so every dispatched
    /// job is accounted for, but they are no longer reported.
    pub fn aggregate(&self, completions: impl IntoIterator<Item = JobOutcome>) -> Verdict {
        let mut verdict = Verdict::default();

        for outcome in completions {
            if verdict.first_failure.is_some() {
                log::debug!("{outcome} (after the run was decided)");
                verdict.outcomes.push(outcome);
                continue;
            }

            self.sink.finished(&outcome);
            verdict.reported += 1;
            if !outcome.is_success() {
                if self.ctx.try_set_failure() {
                    log::debug!("Patch {} decided the run; cancelling", outcome.coord);
                } else {
                    log::debug!("Failure flag already set when patch {} failed", outcome.coord);
                }
                self.canceller.trigger();
                verdict.first_failure = Some(outcome.clone());
            }
            verdict.outcomes.push(outcome);
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::AdmissionGate;
    use crate::sink::RunSummary;
    use std::sync::Mutex;
    use std::time::Duration;
    use tessera_core::{JobStatus, PatchCoord};

    #[derive(Default)]
    struct Finished(Mutex<Vec<PatchCoord>>);

    impl ProgressSink for Finished {
        fn launched(&self, _: PatchCoord) {}
        fn line(&self, _: PatchCoord, _: &str) {}
        fn finished(&self, outcome: &JobOutcome) {
            self.0.lock().unwrap().push(outcome.coord);
        }
        fn summary(&self, _: &RunSummary) {}
    }

    fn outcome(row: u32, col: u32, status: JobStatus) -> JobOutcome {
        let mut outcome = JobOutcome::not_started(PatchCoord::new(row, col), status);
        outcome.exit_code = match outcome.status {
            JobStatus::Succeeded => Some(0),
            JobStatus::Failed => Some(1),
            _ => None,
        };
        outcome
    }

    fn aggregator(sink: Arc<Finished>) -> (Arc<RunContext>, Arc<AdmissionGate>, FailureAggregator) {
        let ctx = Arc::new(RunContext::new());
        let gate = AdmissionGate::new(4);
        let canceller = Arc::new(CancellationController::new(
            Arc::clone(&ctx),
            Arc::clone(&gate),
            Duration::ZERO,
        ));
        let aggregator = FailureAggregator::new(Arc::clone(&ctx), canceller, sink);
        (ctx, gate, aggregator)
    }

    #[test]
    fn all_successes_are_reported() {
        let sink = Arc::new(Finished::default());
        let (ctx, gate, aggregator) = aggregator(Arc::clone(&sink));

        let verdict = aggregator.aggregate(vec![
            outcome(0, 1, JobStatus::Succeeded),
            outcome(0, 0, JobStatus::Succeeded),
        ]);

        assert!(verdict.all_succeeded());
        assert_eq!(verdict.succeeded(), 2);
        assert_eq!(verdict.reported, 2);
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![PatchCoord::new(0, 1), PatchCoord::new(0, 0)]
        );
        assert!(!ctx.has_failed());
        assert!(!gate.is_closed());
    }

    #[test]
    fn first_failure_decides_and_silences_the_rest() {
        let sink = Arc::new(Finished::default());
        let (ctx, gate, aggregator) = aggregator(Arc::clone(&sink));

        let verdict = aggregator.aggregate(vec![
            outcome(0, 0, JobStatus::Succeeded),
            outcome(1, 2, JobStatus::Failed),
            outcome(0, 1, JobStatus::Killed),
            outcome(1, 3, JobStatus::Abandoned),
        ]);

        assert!(!verdict.all_succeeded());
        assert_eq!(verdict.first_failure.as_ref().map(|o| o.coord), Some(PatchCoord::new(1, 2)));
        assert_eq!(verdict.outcomes.len(), 4);
        assert_eq!(verdict.reported, 2);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
        assert!(ctx.has_failed());
        assert!(gate.is_closed());
    }

    #[test]
    fn launch_failure_counts_as_failure() {
        let sink = Arc::new(Finished::default());
        let (ctx, _gate, aggregator) = aggregator(sink);

        let verdict = aggregator.aggregate(vec![outcome(
            2,
            0,
            JobStatus::LaunchFailed("No such file or directory".into()),
        )]);

        assert!(ctx.has_failed());
        assert_eq!(verdict.succeeded(), 0);
        assert!(verdict.first_failure.is_some());
    }
}

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

//! Dispatches one job per patch under the worker budget.

use crate::context::RunContext;
use crate::executor::{Executor, Task};
use crate::gate::{AdmissionGate, Ticket};
use crate::supervisor::ProcessSupervisor;
use crossbeam_channel::Receiver;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tessera_core::{JobDescriptor, JobOutcome, JobStatus};

/// Outcomes of dispatched jobs, yielded in completion order.
pub struct Completions {
    outcomes: Receiver<JobOutcome>,
    remaining: usize,
}

impl Completions {
    /// Number of outcomes not yet received.
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Iterator for Completions {
    type Item = JobOutcome;

    fn next(&mut self) -> Option<JobOutcome> {
        if self.remaining == 0 {
            return None;
        }
        let outcome = self.outcomes.recv().ok()?;
        self.remaining -= 1;
        Some(outcome)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

/// Hands jobs to an executor, each gated by an admission slot held until its
/// supervisor has fully finished.
pub struct Scheduler {
    gate: Arc<AdmissionGate>,
    ctx: Arc<RunContext>,
    supervisor: Arc<ProcessSupervisor>,
}

impl Scheduler {
    /// Creates a scheduler admitting through `gate`.
    pub fn new(
        gate: Arc<AdmissionGate>,
        ctx: Arc<RunContext>,
        supervisor: Arc<ProcessSupervisor>,
    ) -> Self {
        Self {
            gate,
            ctx,
            supervisor,
        }
    }

    /// Submits every job in order and returns their completions.
    ///
    /// Exactly one outcome is produced per job, including jobs the executor
    /// refused and jobs abandoned after a failure.
    pub fn dispatch(&self, executor: &mut dyn Executor, jobs: Vec<JobDescriptor>) -> Completions {
        let (sender, outcomes) = crossbeam_channel::unbounded();
        let remaining = jobs.len();

        for job in jobs {
            let coord = job.coord;
            let ticket = self.gate.ticket();
            let ctx = Arc::clone(&self.ctx);
            let supervisor = Arc::clone(&self.supervisor);
            let sender_for_task = sender.clone();
            let task: Task = Box::new(move || {
                let outcome = run_when_admitted(ticket, &ctx, &supervisor, &job);
                let _ = sender_for_task.send(outcome);
            });

            if let Err(e) = executor.execute(task) {
                log::error!("Patch {coord}: could not be scheduled: {e}");
                let _ = sender.send(JobOutcome::not_started(
                    coord,
                    JobStatus::LaunchFailed(e.to_string()),
                ));
            }
        }
        log::debug!("Dispatched {remaining} jobs");

        Completions {
            outcomes,
            remaining,
        }
    }
}

fn run_when_admitted(
    ticket: Ticket,
    ctx: &RunContext,
    supervisor: &ProcessSupervisor,
    job: &JobDescriptor,
) -> JobOutcome {
    let Some(_permit) = ticket.admit() else {
        log::debug!("Patch {}: abandoned before admission", job.coord);
        return JobOutcome::not_started(job.coord, JobStatus::Abandoned);
    };
    if ctx.has_failed() {
        log::debug!("Patch {}: abandoned after admission", job.coord);
        return JobOutcome::not_started(job.coord, JobStatus::Abandoned);
    }

    panic::catch_unwind(AssertUnwindSafe(|| supervisor.supervise(job))).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("Patch {}: supervisor panicked: {reason}", job.coord);
        JobOutcome::not_started(job.coord, JobStatus::Crashed(reason))
    })
}

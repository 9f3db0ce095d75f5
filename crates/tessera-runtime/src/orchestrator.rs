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

//! Wires one orchestration run end to end.

use crate::aggregator::FailureAggregator;
use crate::cancel::{CancellationController, InterruptHandle};
use crate::context::{CancelReport, RunContext};
use crate::error::RunError;
use crate::executor::{executor_for, Executor};
use crate::gate::AdmissionGate;
use crate::scheduler::Scheduler;
use crate::sink::{ProgressSink, RunSummary};
use crate::supervisor::ProcessSupervisor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::{JobDescriptor, JobOutcome, RunConfig, ScriptTemplate};
use tessera_io::{ImageAssembler, JobBuilder};

/// What happened during a run that got as far as dispatching jobs.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Worker budget the run was admitted under.
    pub workers: usize,
    /// Every job outcome, in completion order.
    pub outcomes: Vec<JobOutcome>,
    /// The failure that decided the run, if any.
    pub first_failure: Option<JobOutcome>,
    /// The composite image, written only when every patch succeeded.
    pub composite: Option<PathBuf>,
    /// Highest number of worker processes alive at the same time.
    pub peak_live: usize,
    /// Worker processes still tracked when the run returned.
    pub live_after: usize,
    /// The cancellation sweep, if one ran.
    pub cancel: Option<CancelReport>,
    /// Whether the run was cut short by an operator interrupt.
    pub interrupted: bool,
    /// Wall time of the run, preparation included.
    pub elapsed: Duration,
}

impl RunReport {
    /// Whether every patch succeeded and the composite exists.
    pub fn succeeded(&self) -> bool {
        !self.interrupted && self.first_failure.is_none() && self.composite.is_some()
    }
}

/// Renders a full image by running one worker per patch.
pub struct Orchestrator {
    config: RunConfig,
    template: Arc<dyn ScriptTemplate>,
    sink: Arc<dyn ProgressSink>,
    interrupt: Arc<InterruptHandle>,
}

impl Orchestrator {
    /// Creates an orchestrator for `config`, generating scripts with
    /// `template` and reporting progress to `sink`.
    pub fn new(
        config: RunConfig,
        template: Arc<dyn ScriptTemplate>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            config,
            template,
            sink,
            interrupt: Arc::new(InterruptHandle::new()),
        }
    }

    /// Handle for cancelling this orchestrator's runs from another thread,
    /// typically a signal watcher.
    pub fn interrupt_handle(&self) -> Arc<InterruptHandle> {
        Arc::clone(&self.interrupt)
    }

    /// The configuration this orchestrator runs with.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs every patch with the configured executor.
    ///
    /// Patch failures are reported in the returned [`RunReport`]; `Err` is
    /// reserved for preparation, executor and assembly problems.
    pub fn run(&self) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let jobs = self.prepare()?;
        let workers = self.config.effective_workers();
        let mut executor = executor_for(self.config.executor, workers)?;
        log::info!(
            "Rendering {} patches with up to {workers} concurrent workers ({:?} executor)",
            jobs.len(),
            self.config.executor
        );
        self.execute(jobs, workers, executor.as_mut(), started)
    }

    /// Runs every patch on a caller-provided executor.
    ///
    /// The executor is joined before this returns.
    pub fn run_with(&self, executor: &mut dyn Executor) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let jobs = self.prepare()?;
        let workers = self.config.effective_workers();
        self.execute(jobs, workers, executor, started)
    }

    /// Writes every working directory and script. Nothing is launched until
    /// all of them exist.
    pub fn prepare(&self) -> Result<Vec<JobDescriptor>, RunError> {
        let builder = JobBuilder::new(
            self.config.grid,
            self.config.params,
            &self.config.build_root,
            &self.config.output_dir,
            self.template.as_ref(),
        );
        let jobs = builder.prepare_all()?;
        log::debug!(
            "Prepared {} jobs under '{}'",
            jobs.len(),
            self.config.build_root.display()
        );
        Ok(jobs)
    }

    fn execute(
        &self,
        jobs: Vec<JobDescriptor>,
        workers: usize,
        executor: &mut dyn Executor,
        started: Instant,
    ) -> Result<RunReport, RunError> {
        let total = jobs.len();
        let ctx = Arc::new(RunContext::new());
        let gate = AdmissionGate::new(workers);
        let canceller = Arc::new(CancellationController::new(
            Arc::clone(&ctx),
            Arc::clone(&gate),
            self.config.kill_grace,
        ));
        let supervisor = Arc::new(ProcessSupervisor::new(
            Arc::clone(&ctx),
            Arc::clone(&self.sink),
            self.config.launcher.clone(),
            self.config.stdout_timeout,
        ));
        let teardown = canceller.teardown_guard();
        self.interrupt.attach(&canceller);

        let scheduler = Scheduler::new(gate, Arc::clone(&ctx), supervisor);
        let completions = scheduler.dispatch(executor, jobs);
        let aggregator =
            FailureAggregator::new(Arc::clone(&ctx), Arc::clone(&canceller), Arc::clone(&self.sink));
        let verdict = aggregator.aggregate(completions);
        executor.join();
        self.interrupt.detach();
        teardown.disarm();

        let interrupted = self.interrupt.is_requested();
        if interrupted {
            log::warn!("Run interrupted; composite will not be assembled");
        }
        let composite = if !interrupted && verdict.all_succeeded() && verdict.outcomes.len() == total {
            let assembler = ImageAssembler::new(self.config.grid, self.config.output_dir.clone());
            Some(assembler.assemble(&self.config.composite_path)?)
        } else {
            None
        };

        self.sink.summary(&RunSummary {
            total,
            reported: verdict.reported,
            succeeded: verdict.succeeded(),
            first_failure: verdict.first_failure.clone(),
            composite: composite.clone(),
        });

        Ok(RunReport {
            workers,
            outcomes: verdict.outcomes,
            first_failure: verdict.first_failure,
            composite,
            peak_live: ctx.peak_live(),
            live_after: ctx.live_count(),
            cancel: canceller.report(),
            interrupted,
            elapsed: started.elapsed(),
        })
    }
}

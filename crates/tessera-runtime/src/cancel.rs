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

//! Terminates outstanding work once a run has failed, is interrupted by the
//! operator, or is torn down.

use crate::context::{CancelReport, RunContext};
use crate::gate::AdmissionGate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Fires at most once per run: closes the admission gate so queued jobs are
/// abandoned, then kills every tracked worker process.
#[derive(Debug)]
pub struct CancellationController {
    ctx: Arc<RunContext>,
    gate: Arc<AdmissionGate>,
    grace: Duration,
    fired: AtomicBool,
    report: Mutex<Option<CancelReport>>,
}

impl CancellationController {
    /// Creates a controller for one run.
    pub fn new(ctx: Arc<RunContext>, gate: Arc<AdmissionGate>, grace: Duration) -> Self {
        Self {
            ctx,
            gate,
            grace,
            fired: AtomicBool::new(false),
            report: Mutex::new(None),
        }
    }

    /// Cancels the run. Only the first call does anything; later calls
    /// return `None`.
    pub fn trigger(&self) -> Option<CancelReport> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return None;
        }
        self.ctx.try_set_failure();
        self.gate.close();
        let report = self.ctx.terminate_all(self.grace);
        log::info!(
            "Cancelled outstanding patches: {} killed, {} already exited, {} leaked",
            report.killed,
            report.already_exited,
            report.leaked
        );
        *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
        Some(report)
    }

    /// Whether the controller has fired.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// The result of the sweep, once fired.
    pub fn report(&self) -> Option<CancelReport> {
        *self.report.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms a guard that cancels the run if it is dropped before
    /// [`TeardownGuard::disarm`] is called.
    pub fn teardown_guard(self: &Arc<Self>) -> TeardownGuard {
        TeardownGuard {
            controller: Some(Arc::clone(self)),
        }
    }
}

/// Run-teardown hook. Dropping it while armed, for example while unwinding
/// from a panic, terminates every tracked worker.
#[derive(Debug)]
#[must_use = "dropping the guard immediately cancels the run"]
pub struct TeardownGuard {
    controller: Option<Arc<CancellationController>>,
}

impl TeardownGuard {
    /// Marks the run as having completed normally.
    pub fn disarm(mut self) {
        self.controller.take();
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if let Some(controller) = self.controller.take() {
            log::warn!("Run interrupted before completion; terminating workers");
            controller.trigger();
        }
    }
}

/// Operator interrupt for an orchestrator, safe to fire from any thread.
///
/// An interrupt cancels the active run the same way a failed patch does. A
/// request made while no run is active is remembered and cancels the next run
/// as soon as it starts.
#[derive(Debug, Default)]
pub struct InterruptHandle {
    requested: AtomicBool,
    active: Mutex<Option<Arc<CancellationController>>>,
}

impl InterruptHandle {
    /// Creates a handle with no pending request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Blocks until the sweep of the active run, if
    /// any, has finished.
    pub fn interrupt(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        log::warn!("Interrupt requested; cancelling outstanding patches");
        if let Some(controller) = self.active() {
            controller.trigger();
        }
    }

    /// Whether an interrupt has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn active(&self) -> Option<Arc<CancellationController>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn attach(&self, controller: &Arc<CancellationController>) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(controller));
        if self.is_requested() {
            controller.trigger();
        }
    }

    pub(crate) fn detach(&self) {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

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

//! # Tessera Runtime
//!
//! Runs one external worker process per patch under a worker budget,
//! supervises each process, aborts the whole run on the first failure and
//! assembles the composite once every patch has succeeded.
//!
//! The pieces compose in this order:
//!
//! - [`Scheduler`] hands each job to an [`Executor`] behind an
//!   [`AdmissionGate`] with K slots.
//! - [`ProcessSupervisor`] launches the job's script, relays its output and
//!   reaps it, tracking the process in the shared [`RunContext`].
//! - [`FailureAggregator`] consumes outcomes in completion order and fires the
//!   [`CancellationController`] on the first failure.
//! - [`Orchestrator`] wires all of the above for one run.

#![warn(missing_docs)]

pub mod aggregator;
pub mod cancel;
pub mod context;
pub mod error;
pub mod executor;
pub mod gate;
pub mod orchestrator;
pub mod scheduler;
pub mod sink;
pub mod supervisor;

pub use aggregator::{FailureAggregator, Verdict};
pub use cancel::{CancellationController, InterruptHandle, TeardownGuard};
pub use context::{CancelReport, RunContext, WorkerProcess};
pub use error::RunError;
pub use executor::{executor_for, Executor, ExecutorError, Task, ThreadPerJob, WorkerPool};
pub use gate::{AdmissionGate, Permit, Ticket};
pub use orchestrator::{Orchestrator, RunReport};
pub use scheduler::{Completions, Scheduler};
pub use sink::{LogSink, ProgressSink, RunSummary};
pub use supervisor::ProcessSupervisor;

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

//! Run-level errors.
//!
//! Per-patch failures are [`JobOutcome`](tessera_core::JobOutcome) values and
//! never appear here; only problems that stop the run as a whole do.

use crate::executor::ExecutorError;
use tessera_io::{AssembleError, PrepareError};
use thiserror::Error;

/// A failure that aborts an orchestration run.
#[derive(Debug, Error)]
pub enum RunError {
    /// A working directory or script could not be written. Nothing was launched.
    #[error("job preparation failed: {0}")]
    Prepare(#[from] PrepareError),
    /// The executor could not be started.
    #[error("could not start executor: {0}")]
    Executor(#[from] ExecutorError),
    /// Every patch succeeded but the composite could not be produced.
    #[error("image assembly failed: {0}")]
    Assemble(#[from] AssembleError),
}

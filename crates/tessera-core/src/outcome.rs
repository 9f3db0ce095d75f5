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

//! The recorded result of one supervised worker process.

use crate::grid::PatchCoord;
use std::fmt;
use std::time::Duration;

/// How a dispatched job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// The worker exited with code 0.
    Succeeded,
    /// The worker exited with a non-zero code.
    Failed,
    /// The worker was terminated by a signal, usually by cancellation.
    Killed,
    /// The worker could not be started.
    LaunchFailed(String),
    /// The job was never admitted because the run had already failed.
    Abandoned,
    /// The supervising thread panicked before producing an outcome.
    Crashed(String),
}

/// Result of one completed Process Supervisor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// The patch the job rendered.
    pub coord: PatchCoord,
    /// How the job ended.
    pub status: JobStatus,
    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Number of output lines relayed to the progress sink.
    pub lines_relayed: u64,
    /// Number of read attempts that hit the stdout timeout.
    pub read_timeouts: u64,
    /// Wall time from launch to reaping.
    pub elapsed: Duration,
}

impl JobOutcome {
    /// An outcome for a job that never reached a running process.
    pub fn not_started(coord: PatchCoord, status: JobStatus) -> Self {
        Self {
            coord,
            status,
            exit_code: None,
            lines_relayed: 0,
            read_timeouts: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns `true` only for a worker that exited with code 0.
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Killed => write!(f, "killed"),
            JobStatus::LaunchFailed(reason) => write!(f, "could not be launched: {reason}"),
            JobStatus::Abandoned => write!(f, "abandoned"),
            JobStatus::Crashed(reason) => write!(f, "crashed: {reason}"),
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Patch {} {}", self.coord, self.status)?;
        if let Some(code) = self.exit_code.filter(|code| *code != 0) {
            write!(f, " (exit code {code})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_succeeded_counts_as_success() {
        let coord = PatchCoord::new(0, 0);
        assert!(!JobOutcome::not_started(coord, JobStatus::Abandoned).is_success());
        assert!(!JobOutcome::not_started(coord, JobStatus::Killed).is_success());
        assert!(JobOutcome::not_started(coord, JobStatus::Succeeded).is_success());
    }

    #[test]
    fn display_mentions_non_zero_exit_code() {
        let outcome = JobOutcome {
            exit_code: Some(1),
            ..JobOutcome::not_started(PatchCoord::new(1, 2), JobStatus::Failed)
        };
        assert_eq!(outcome.to_string(), "Patch (1, 2) failed (exit code 1)");
    }
}

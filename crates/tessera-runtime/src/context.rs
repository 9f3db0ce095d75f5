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

//! Process-wide state of one orchestration run.

use std::collections::HashMap;
use std::io;
use std::process::Child;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tessera_core::PatchCoord;

/// A worker process handle. The supervisor that spawned it holds the only
/// strong reference.
pub type WorkerProcess = Arc<Mutex<Child>>;

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a termination sweep found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelReport {
    /// Processes that were sent a kill signal.
    pub killed: usize,
    /// Handles whose process had already exited.
    pub already_exited: usize,
    /// Killed processes still alive when the grace period ran out.
    pub leaked: usize,
}

/// Shared state for one run: the registry of live worker processes and the
/// global failure flag.
///
/// The registry only holds weak references, used to terminate processes out
/// of band. Each entry is removed exactly once, either by the owning
/// supervisor on completion or by [`RunContext::terminate_all`].
#[derive(Debug, Default)]
pub struct RunContext {
    processes: Mutex<HashMap<PatchCoord, Weak<Mutex<Child>>>>,
    peak_live: AtomicUsize,
    failed: AtomicBool,
}

impl RunContext {
    /// Creates an empty context with the failure flag cleared.
    pub fn new() -> Self {
        Self::default()
    }

    fn processes(&self) -> MutexGuard<'_, HashMap<PatchCoord, Weak<Mutex<Child>>>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tracks a freshly spawned worker.
    pub fn register(&self, coord: PatchCoord, process: &WorkerProcess) {
        let mut processes = self.processes();
        processes.insert(coord, Arc::downgrade(process));
        self.peak_live.fetch_max(processes.len(), Ordering::SeqCst);
    }

    /// Stops tracking a worker. Returns `false` if the handle had already been
    /// removed by a termination sweep.
    pub fn unregister(&self, coord: PatchCoord) -> bool {
        self.processes().remove(&coord).is_some()
    }

    /// Returns `true` while the worker is still tracked.
    pub fn is_registered(&self, coord: PatchCoord) -> bool {
        self.processes().contains_key(&coord)
    }

    /// Number of currently tracked workers.
    pub fn live_count(&self) -> usize {
        self.processes().len()
    }

    /// Highest number of simultaneously tracked workers seen in this run.
    pub fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }

    /// Sets the failure flag. Only the first caller gets `true`.
    pub fn try_set_failure(&self) -> bool {
        self.failed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Whether the run has been flagged as failed.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Removes every tracked handle and kills its process, then waits up to
    /// `grace` for the killed processes to die.
    ///
    /// Termination errors for processes that already exited are ignored.
    /// Processes still alive after the grace period are logged, not retried.
    pub fn terminate_all(&self, grace: Duration) -> CancelReport {
        let drained: Vec<_> = self.processes().drain().collect();
        let mut report = CancelReport::default();
        let mut dying = Vec::new();

        for (coord, handle) in drained {
            let Some(process) = handle.upgrade() else {
                report.already_exited += 1;
                continue;
            };
            let mut child = lock_child(&process);
            if matches!(child.try_wait(), Ok(Some(_))) {
                report.already_exited += 1;
                continue;
            }
            match terminate(&mut child) {
                Ok(()) => {
                    log::debug!("Patch {coord}: sent kill to process {}", child.id());
                    report.killed += 1;
                    drop(child);
                    dying.push((coord, process));
                }
                Err(e) => {
                    log::debug!("Patch {coord}: kill failed ({e}), treating as exited");
                    report.already_exited += 1;
                }
            }
        }

        let deadline = Instant::now() + grace;
        loop {
            dying.retain(|(_, process)| !matches!(lock_child(process).try_wait(), Ok(Some(_))));
            if dying.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }
        for (coord, process) in &dying {
            log::warn!(
                "Patch {coord}: process {} still alive {:.1}s after kill",
                lock_child(process).id(),
                grace.as_secs_f64()
            );
        }
        report.leaked = dying.len();
        report
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if self.live_count() > 0 {
            let report = self.terminate_all(Duration::ZERO);
            log::warn!(
                "Run context dropped with live workers: killed {}, already exited {}",
                report.killed,
                report.already_exited
            );
        }
    }
}

pub(crate) fn lock_child(process: &WorkerProcess) -> MutexGuard<'_, Child> {
    process.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kills a worker together with everything it spawned.
///
/// Workers are started as process-group leaders, so the whole group is
/// signalled; a missing group falls back to killing the child alone. A child
/// that has already been reaped is left alone, as its pid may have been reused.
#[cfg(unix)]
pub(crate) fn terminate(child: &mut Child) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if child.try_wait()?.is_some() {
        return Ok(());
    }
    match killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => child.kill(),
        Err(e) => Err(io::Error::from(e)),
    }
}

#[cfg(not(unix))]
pub(crate) fn terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

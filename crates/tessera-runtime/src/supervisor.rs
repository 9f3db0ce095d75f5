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

//! Lifecycle of a single worker process: launch, output relay, exit.

use crate::context::{lock_child, terminate, RunContext, WorkerProcess};
use crate::sink::ProgressSink;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tessera_core::{JobDescriptor, JobOutcome, JobStatus, Launcher, PatchCoord};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Owns one external worker process from spawn to reaping.
pub struct ProcessSupervisor {
    ctx: Arc<RunContext>,
    sink: Arc<dyn ProgressSink>,
    launcher: Launcher,
    stdout_timeout: Duration,
}

impl ProcessSupervisor {
    /// Creates a supervisor launching scripts through `launcher` and waiting at
    /// most `stdout_timeout` for each output line before re-checking state.
    ///
    /// Timeouts shorter than 10ms are raised to 10ms.
    pub fn new(
        ctx: Arc<RunContext>,
        sink: Arc<dyn ProgressSink>,
        launcher: Launcher,
        stdout_timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            sink,
            launcher,
            stdout_timeout: stdout_timeout.max(MIN_READ_TIMEOUT),
        }
    }

    fn command(&self, job: &JobDescriptor) -> Command {
        let mut command = Command::new(&self.launcher.program);
        command
            .args(&self.launcher.args)
            .arg(&job.script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
    }

    /// Runs the job to completion.
    ///
    /// A non-zero exit is a normal outcome, not an error; so is a launch that
    /// fails before any process exists.
    pub fn supervise(&self, job: &JobDescriptor) -> JobOutcome {
        let coord = job.coord;
        let started = Instant::now();
        self.sink.launched(coord);

        let mut child = match self.command(job).spawn() {
            Ok(child) => child,
            Err(e) => {
                log::error!("Patch {coord}: failed to launch '{}': {e}", self.launcher);
                return JobOutcome::not_started(coord, JobStatus::LaunchFailed(e.to_string()));
            }
        };
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let process: WorkerProcess = Arc::new(Mutex::new(child));
        self.ctx.register(coord, &process);
        let _unwind = KillOnUnwind {
            ctx: &self.ctx,
            coord,
            process: &process,
        };
        log::debug!("Patch {coord}: launched process {pid}");

        // A sweep that ran between our spawn and our registration missed us.
        if self.ctx.has_failed() && self.ctx.unregister(coord) {
            let _ = terminate(&mut lock_child(&process));
            return self.finish(coord, &process, started, RelayStats::default());
        }

        let (lines, output) = crossbeam_channel::unbounded::<String>();
        let readers = match spawn_readers(coord, stdout, stderr, lines) {
            Ok(readers) => readers,
            Err(e) => {
                log::error!("Patch {coord}: failed to start output relay: {e}");
                if self.ctx.unregister(coord) {
                    let _ = terminate(&mut lock_child(&process));
                }
                let mut outcome = self.finish(coord, &process, started, RelayStats::default());
                outcome.status = JobStatus::LaunchFailed(e.to_string());
                return outcome;
            }
        };

        let mut stats = RelayStats::default();
        let drained = loop {
            match output.recv_timeout(self.stdout_timeout) {
                Ok(line) => {
                    stats.lines += 1;
                    self.sink.line(coord, &line);
                }
                Err(RecvTimeoutError::Timeout) => {
                    stats.timeouts += 1;
                    log::trace!(
                        "Patch {coord}: no output for {:.1}s",
                        self.stdout_timeout.as_secs_f64()
                    );
                    if !self.ctx.is_registered(coord) {
                        log::debug!("Patch {coord}: cancelled, no longer relaying output");
                        break false;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break true,
            }
        };

        // Readers of a cancelled process may be held open by orphans that
        // escaped the process group; leave them detached.
        if drained {
            for reader in readers {
                let _ = reader.join();
            }
        }

        self.finish(coord, &process, started, stats)
    }

    /// Waits for the process and builds its outcome.
    ///
    /// The process stays registered until it has been reaped, so a worker
    /// that closed its output early can still be reached by a sweep.
    fn finish(
        &self,
        coord: PatchCoord,
        process: &WorkerProcess,
        started: Instant,
        stats: RelayStats,
    ) -> JobOutcome {
        let exit = wait_for_exit(process);
        let tracked = self.ctx.unregister(coord);
        let (status, exit_code) = match exit {
            Ok(exit) => classify(exit),
            Err(e) => {
                log::error!("Patch {coord}: failed to wait for process: {e}");
                if tracked {
                    let _ = terminate(&mut lock_child(process));
                }
                (JobStatus::Failed, None)
            }
        };
        if !tracked {
            log::debug!("Patch {coord}: process was terminated by cancellation");
        }
        let outcome = JobOutcome {
            coord,
            status,
            exit_code,
            lines_relayed: stats.lines,
            read_timeouts: stats.timeouts,
            elapsed: started.elapsed(),
        };
        log::debug!(
            "{outcome} after {:.2}s ({} lines, {} read timeouts)",
            outcome.elapsed.as_secs_f64(),
            outcome.lines_relayed,
            outcome.read_timeouts
        );
        outcome
    }
}

/// Kills and reaps a still-tracked worker when its supervising thread unwinds.
struct KillOnUnwind<'a> {
    ctx: &'a RunContext,
    coord: PatchCoord,
    process: &'a WorkerProcess,
}

impl Drop for KillOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() && self.ctx.unregister(self.coord) {
            let mut child = lock_child(self.process);
            log::warn!("Patch {}: killing process {} after a panic", self.coord, child.id());
            let _ = terminate(&mut child);
            let _ = child.wait();
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RelayStats {
    lines: u64,
    timeouts: u64,
}

fn classify(exit: ExitStatus) -> (JobStatus, Option<i32>) {
    match exit.code() {
        Some(0) => (JobStatus::Succeeded, Some(0)),
        Some(code) => (JobStatus::Failed, Some(code)),
        None => (JobStatus::Killed, None),
    }
}

/// Polls for exit so the child lock is never held across a blocking wait,
/// leaving it free for an out-of-band kill.
fn wait_for_exit(process: &WorkerProcess) -> io::Result<ExitStatus> {
    loop {
        if let Some(status) = lock_child(process).try_wait()? {
            return Ok(status);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn spawn_readers(
    coord: PatchCoord,
    stdout: Option<impl Read + Send + 'static>,
    stderr: Option<impl Read + Send + 'static>,
    lines: Sender<String>,
) -> io::Result<Vec<JoinHandle<()>>> {
    let mut readers = Vec::with_capacity(2);
    if let Some(pipe) = stdout {
        readers.push(spawn_reader(coord, "stdout", pipe, lines.clone())?);
    }
    if let Some(pipe) = stderr {
        readers.push(spawn_reader(coord, "stderr", pipe, lines)?);
    }
    Ok(readers)
}

fn spawn_reader(
    coord: PatchCoord,
    stream: &'static str,
    pipe: impl Read + Send + 'static,
    lines: Sender<String>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("tessera-{}-{}-{stream}", coord.row, coord.col))
        .spawn(move || relay_lines(coord, stream, pipe, lines))
}

/// Splits a pipe into lines, decoding lossily, until end of stream.
fn relay_lines(coord: PatchCoord, stream: &str, pipe: impl Read, lines: Sender<String>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if lines.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::debug!("Patch {coord}: {stream} read error: {e}");
                break;
            }
        }
    }
}

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

//! Operator console: one banner per patch record, written atomically.

use crate::helpers::*;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use tessera_core::{JobOutcome, PatchCoord};
use tessera_runtime::{ProgressSink, RunSummary};

/// Prints per-patch progress as it happens.
///
/// Each record is a banner naming the patch followed by its payload, both
/// written under one lock so concurrent patches never interleave inside a
/// record.
pub struct ConsoleSink<W: Write + Send> {
    out: Mutex<W>,
    palette: Palette,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), Palette::from_env())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W, palette: Palette) -> Self {
        Self {
            out: Mutex::new(out),
            palette,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, coord: PatchCoord, color: &str, write_payload: impl FnOnce(&mut W, Palette) -> io::Result<()>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = write_task_start(&mut *out, self.palette, &format!("Patch {coord}"), color)
            .and_then(|()| write_payload(&mut *out, self.palette))
            .and_then(|()| out.flush());
        if let Err(e) = written {
            log::warn!("Could not write progress for patch {coord}: {e}");
        }
    }
}

impl<W: Write + Send> ProgressSink for ConsoleSink<W> {
    fn launched(&self, coord: PatchCoord) {
        self.record(coord, BLUE, |out, _| writeln!(out, "Launched!"));
    }

    fn line(&self, coord: PatchCoord, line: &str) {
        self.record(coord, CYAN, |out, _| writeln!(out, "{line}"));
    }

    fn finished(&self, outcome: &JobOutcome) {
        let color = if outcome.is_success() { GREEN } else { RED };
        self.record(outcome.coord, color, |out, palette| {
            if outcome.is_success() {
                write_success(out, palette, "Process succeeded!")
            } else {
                write_error(out, palette, &format!("Process {}", outcome.status))
            }
        });
    }

    fn summary(&self, summary: &RunSummary) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let palette = self.palette;
        let written = writeln!(
            out,
            "\n{}{}{RULE}{RULE}{}",
            palette.paint(BOLD),
            palette.paint(YELLOW),
            palette.paint(RESET)
        )
        .and_then(|()| match (&summary.first_failure, &summary.composite) {
            (None, Some(path)) => write_success(
                &mut *out,
                palette,
                &format!(
                    "All {} patches were successfully rendered! Composite written to '{}'",
                    summary.total,
                    path.display()
                ),
            ),
            (Some(failure), _) => write_error(
                &mut *out,
                palette,
                &format!(
                    "{failure}; {} of {} patches completed",
                    summary.succeeded, summary.total
                ),
            ),
            (None, None) => write_error(&mut *out, palette, "Run ended without a composite image"),
        })
        .and_then(|()| out.flush());
        if let Err(e) = written {
            log::warn!("Could not write run summary: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread;
    use tessera_core::JobStatus;

    fn plain() -> ConsoleSink<Vec<u8>> {
        ConsoleSink::new(Vec::new(), Palette::PLAIN)
    }

    fn text(sink: ConsoleSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn records_carry_a_patch_banner() {
        let sink = plain();
        sink.launched(PatchCoord::new(1, 2));
        sink.line(PatchCoord::new(1, 2), "Scanlines remaining: 4");

        let out = text(sink);
        assert_eq!(out.matches("Patch (1, 2)").count(), 2);
        assert!(out.contains("Launched!\n"));
        assert!(out.contains("Scanlines remaining: 4\n"));
        assert!(!out.contains('\x1b'), "plain palette must not emit escapes");
    }

    #[test]
    fn failed_outcome_names_the_status() {
        let sink = plain();
        let mut outcome = JobOutcome::not_started(PatchCoord::new(0, 3), JobStatus::Failed);
        outcome.exit_code = Some(2);
        sink.finished(&outcome);

        let out = text(sink);
        assert!(out.contains("Patch (0, 3)"));
        assert!(out.contains("✗ Process failed"));
    }

    #[test]
    fn summary_is_one_outcome_line() {
        let sink = plain();
        sink.summary(&RunSummary {
            total: 16,
            reported: 16,
            succeeded: 16,
            first_failure: None,
            composite: Some(PathBuf::from("outputs/image.png")),
        });

        let out = text(sink);
        assert!(out.contains("✓ All 16 patches were successfully rendered! Composite written to 'outputs/image.png'"));
    }

    #[test]
    fn concurrent_records_do_not_interleave() {
        let sink = Arc::new(plain());
        let handles: Vec<_> = (0..4)
            .map(|col| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for i in 0..50 {
                        sink.line(PatchCoord::new(0, col), &format!("line {i} of patch {col}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sink = Arc::try_unwrap(sink).ok().unwrap();
        let out = text(sink);
        let lines: Vec<&str> = out.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 400);
        for record in lines.chunks(2) {
            let banner_col = record[0].split(", ").nth(1).and_then(|s| s.chars().next()).unwrap();
            assert!(record[1].ends_with(&format!("of patch {banner_col}")), "{record:?}");
        }
    }
}

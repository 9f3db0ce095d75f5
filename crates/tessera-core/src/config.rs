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

//! Run configuration.

use crate::grid::{GridDimensions, GridError, GridSpec};
use crate::job::{Launcher, RenderParams};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// An error raised when a configuration value cannot be used.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The grid dimensions are invalid.
    Grid(GridError),
    /// A duration is negative, not a number, or too large.
    InvalidSeconds {
        /// The setting that was rejected.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },
    /// A duration that must be positive is zero.
    ZeroSeconds {
        /// The setting that was rejected.
        field: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Grid(e) => write!(f, "invalid grid: {e}"),
            ConfigError::InvalidSeconds { field, value } => {
                write!(f, "{field} must be a finite, non-negative number of seconds, got {value}")
            }
            ConfigError::ZeroSeconds { field } => write!(f, "{field} must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Grid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GridError> for ConfigError {
    fn from(e: GridError) -> Self {
        ConfigError::Grid(e)
    }
}

/// Converts a seconds value from a config file or flag into a [`Duration`].
///
/// Zero is accepted only when `allow_zero` is set.
pub fn seconds(field: &'static str, value: f64, allow_zero: bool) -> Result<Duration, ConfigError> {
    let duration =
        Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidSeconds { field, value })?;
    if duration.is_zero() && !allow_zero {
        return Err(ConfigError::ZeroSeconds { field });
    }
    Ok(duration)
}

/// The scheduling model used to run admitted jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// A fixed pool of worker threads, one borrowed per admitted job.
    #[default]
    Pool,
    /// One parked thread per dispatched job, admitted through the gate.
    Threads,
}

/// Complete configuration of one orchestration run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Image and patch dimensions.
    pub grid: GridSpec,
    /// Parameters passed through to every worker.
    pub params: RenderParams,
    /// Worker budget K. Zero means "use available parallelism".
    pub workers: usize,
    /// Bound on a single wait for the next output line.
    pub stdout_timeout: Duration,
    /// How long cancelled processes may take to die before being logged as leaked.
    pub kill_grace: Duration,
    /// Root under which per-patch working directories are created.
    pub build_root: PathBuf,
    /// Directory holding one pixel file per patch.
    pub output_dir: PathBuf,
    /// Final composite image path.
    pub composite_path: PathBuf,
    /// Source tree handed to the build script.
    pub source_dir: PathBuf,
    /// Command prefix used to launch each patch script.
    pub launcher: Launcher,
    /// Scheduling model.
    pub executor: ExecutorKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            grid: GridSpec::default(),
            params: RenderParams::default(),
            workers: 16,
            stdout_timeout: Duration::from_secs(1),
            kill_grace: Duration::from_secs(5),
            build_root: PathBuf::from("build"),
            output_dir: PathBuf::from("outputs"),
            composite_path: PathBuf::from("outputs/image.png"),
            source_dir: PathBuf::from("."),
            launcher: Launcher::default(),
            executor: ExecutorKind::default(),
        }
    }
}

impl RunConfig {
    /// The worker budget with zero resolved to the host's available parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or_else(|e| {
                log::warn!("Could not query available parallelism ({e}); using 1 worker");
                1
            })
    }

    /// Overlays every field present in `file` onto this configuration.
    ///
    /// Nothing is changed when a value is rejected.
    pub fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        let mut next = self.clone();
        next.overlay(file)?;
        *self = next;
        Ok(())
    }

    fn overlay(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(dims) = file.grid {
            self.grid = dims.into_spec(self.grid)?;
        }
        if let Some(params) = file.render {
            let current = &mut self.params;
            current.num_samples = params.num_samples.unwrap_or(current.num_samples);
            current.max_depth = params.max_depth.unwrap_or(current.max_depth);
            current.random_seed = params.random_seed.unwrap_or(current.random_seed);
            current.constexpr = params.constexpr.unwrap_or(current.constexpr);
        }
        if let Some(workers) = file.workers {
            self.workers = workers;
        }
        if let Some(secs) = file.stdout_timeout_secs {
            self.stdout_timeout = seconds("stdout_timeout_secs", secs, false)?;
        }
        if let Some(secs) = file.kill_grace_secs {
            self.kill_grace = seconds("kill_grace_secs", secs, true)?;
        }
        if let Some(dir) = file.build_root {
            self.build_root = dir;
        }
        if let Some(dir) = file.output_dir {
            self.output_dir = dir;
        }
        if let Some(path) = file.composite_path {
            self.composite_path = path;
        }
        if let Some(dir) = file.source_dir {
            self.source_dir = dir;
        }
        if let Some(launcher) = file.launcher {
            self.launcher = launcher;
        }
        if let Some(executor) = file.executor {
            self.executor = executor;
        }
        Ok(())
    }
}

/// A partial configuration as read from a `Tessera.toml` file.
///
/// Every field is optional; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Grid dimensions.
    pub grid: Option<PartialGrid>,
    /// Rendering parameters.
    pub render: Option<PartialRender>,
    /// Worker budget K.
    pub workers: Option<usize>,
    /// Stdout read timeout, in seconds.
    pub stdout_timeout_secs: Option<f64>,
    /// Kill grace period, in seconds.
    pub kill_grace_secs: Option<f64>,
    /// Per-patch working directory root.
    pub build_root: Option<PathBuf>,
    /// Patch output directory.
    pub output_dir: Option<PathBuf>,
    /// Composite image path.
    pub composite_path: Option<PathBuf>,
    /// Renderer source tree.
    pub source_dir: Option<PathBuf>,
    /// Launch command prefix.
    pub launcher: Option<Launcher>,
    /// Scheduling model.
    pub executor: Option<ExecutorKind>,
}

/// Grid dimensions where any field may be omitted.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct PartialGrid {
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
    pub patch_width: Option<u32>,
    pub patch_height: Option<u32>,
}

impl PartialGrid {
    /// Fills absent fields from `base` and validates the result.
    pub fn into_spec(self, base: GridSpec) -> Result<GridSpec, GridError> {
        let base = GridDimensions::from(base);
        GridSpec::try_from(GridDimensions {
            image_width: self.image_width.unwrap_or(base.image_width),
            image_height: self.image_height.unwrap_or(base.image_height),
            patch_width: self.patch_width.unwrap_or(base.patch_width),
            patch_height: self.patch_height.unwrap_or(base.patch_height),
        })
    }
}

/// Rendering parameters where any field may be omitted.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct PartialRender {
    pub num_samples: Option<u32>,
    pub max_depth: Option<u32>,
    pub random_seed: Option<u32>,
    pub constexpr: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_driver() {
        let config = RunConfig::default();
        assert_eq!(config.grid.image_width(), 1200);
        assert_eq!(config.grid.image_height(), 800);
        assert_eq!(config.params.num_samples, 500);
        assert_eq!(config.params.max_depth, 50);
        assert_eq!(config.workers, 16);
        assert_eq!(config.stdout_timeout, Duration::from_secs(1));
        assert_eq!(config.launcher.to_string(), "srun bash");
    }

    #[test]
    fn zero_workers_resolves_to_parallelism() {
        let config = RunConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn file_overrides_only_present_fields() {
        let file: FileConfig = toml::from_str(
            r#"
            workers = 4
            stdout_timeout_secs = 0.5
            executor = "threads"

            [grid]
            patch_width = 600

            [render]
            constexpr = true

            [launcher]
            program = "bash"
            "#,
        )
        .unwrap();

        let mut config = RunConfig::default();
        config.apply_file(file).unwrap();

        assert_eq!(config.workers, 4);
        assert_eq!(config.stdout_timeout, Duration::from_millis(500));
        assert_eq!(config.executor, ExecutorKind::Threads);
        assert_eq!(config.grid.patch_width(), 600);
        assert_eq!(config.grid.patch_height(), 200);
        assert_eq!(config.grid.cols(), 2);
        assert!(config.params.constexpr);
        assert_eq!(config.params.num_samples, 500);
        assert_eq!(config.launcher, Launcher::new("bash", Vec::<String>::new()));
    }

    #[test]
    fn file_with_uneven_grid_is_rejected() {
        let file: FileConfig = toml::from_str("[grid]\npatch_width = 700\n").unwrap();
        let mut config = RunConfig::default();
        assert!(matches!(
            config.apply_file(file),
            Err(ConfigError::Grid(GridError::NotDivisible { axis: "width", .. }))
        ));
    }

    #[test]
    fn file_with_unusable_durations_is_rejected() {
        for (text, field) in [
            ("stdout_timeout_secs = -1.0", "stdout_timeout_secs"),
            ("stdout_timeout_secs = nan", "stdout_timeout_secs"),
            ("kill_grace_secs = 1e300", "kill_grace_secs"),
            ("kill_grace_secs = -inf", "kill_grace_secs"),
        ] {
            let file: FileConfig = toml::from_str(text).unwrap();
            let mut config = RunConfig::default();
            match config.apply_file(file) {
                Err(ConfigError::InvalidSeconds { field: rejected, .. }) => assert_eq!(rejected, field),
                other => panic!("{text}: expected an invalid duration, got {other:?}"),
            }
            assert_eq!(config.stdout_timeout, Duration::from_secs(1), "{text} left the config untouched");
        }
    }

    #[test]
    fn zero_read_timeout_is_rejected_but_zero_grace_is_allowed() {
        let file: FileConfig = toml::from_str("stdout_timeout_secs = 0.0").unwrap();
        assert_eq!(
            RunConfig::default().apply_file(file),
            Err(ConfigError::ZeroSeconds {
                field: "stdout_timeout_secs"
            })
        );

        let file: FileConfig = toml::from_str("kill_grace_secs = 0.0").unwrap();
        let mut config = RunConfig::default();
        config.apply_file(file).unwrap();
        assert_eq!(config.kill_grace, Duration::ZERO);
    }
}

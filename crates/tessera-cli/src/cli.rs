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

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::path::PathBuf;
use tessera_core::config::seconds;
use tessera_core::{ExecutorKind, FileConfig, GridError, GridSpec, Launcher, RunConfig};

/// Tessera - renders an image patch by patch, one supervised worker process per patch
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build and render each patch separately (one parked thread per patch by default)
    Compile(RunArgs),
    /// Render each patch separately on a fixed pool of worker threads
    Render(RunArgs),
}

impl Commands {
    pub fn args(&self) -> &RunArgs {
        match self {
            Commands::Compile(args) | Commands::Render(args) => args,
        }
    }

    /// The scheduling model used when neither the flags nor the config file pick one.
    pub fn default_executor(&self) -> ExecutorKind {
        match self {
            Commands::Compile(_) => ExecutorKind::Threads,
            Commands::Render(_) => ExecutorKind::Pool,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorArg {
    /// Fixed pool of K OS threads
    Pool,
    /// One thread per patch, parked until admitted
    Threads,
}

impl From<ExecutorArg> for ExecutorKind {
    fn from(arg: ExecutorArg) -> Self {
        match arg {
            ExecutorArg::Pool => ExecutorKind::Pool,
            ExecutorArg::Threads => ExecutorKind::Threads,
        }
    }
}

/// Flags shared by both entry points. Every flag overrides the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Whether to enable compile-time ray tracing
    #[arg(long)]
    pub constexpr: bool,

    /// Width of the image
    #[arg(long, alias = "image_width")]
    pub image_width: Option<u32>,

    /// Height of the image
    #[arg(long, alias = "image_height")]
    pub image_height: Option<u32>,

    /// Width of each patch
    #[arg(long, alias = "patch_width")]
    pub patch_width: Option<u32>,

    /// Height of each patch
    #[arg(long, alias = "patch_height")]
    pub patch_height: Option<u32>,

    /// Maximum depth for recursive ray tracing
    #[arg(long, alias = "max_depth")]
    pub max_depth: Option<u32>,

    /// Number of samples for multi-sample anti-aliasing
    #[arg(long, alias = "num_samples")]
    pub num_samples: Option<u32>,

    /// Random seed for the Monte Carlo approximation (drawn per run if unset)
    #[arg(long, alias = "random_seed")]
    pub random_seed: Option<u32>,

    /// Maximum number of concurrently running workers (0 uses every core)
    #[arg(long, short = 'j', alias = "max_workers")]
    pub max_workers: Option<usize>,

    /// Timeout in seconds for reading one line from a worker's output
    #[arg(long, alias = "stdout_timeout")]
    pub stdout_timeout: Option<f64>,

    /// Seconds a cancelled worker may take to die before it is reported as leaked
    #[arg(long)]
    pub kill_grace: Option<f64>,

    /// Scheduling model
    #[arg(long, value_enum)]
    pub executor: Option<ExecutorArg>,

    /// Command prefix each patch script is launched with
    #[arg(long)]
    pub launcher: Option<String>,

    /// Renderer source tree passed to CMake
    #[arg(long)]
    pub source_dir: Option<PathBuf>,

    /// Root directory for per-patch working directories
    #[arg(long)]
    pub build_root: Option<PathBuf>,

    /// Directory receiving one pixel file per patch
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Path of the final composite image
    #[arg(long)]
    pub composite: Option<PathBuf>,

    /// Configuration file (defaults to ./Tessera.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report patch progress through the logger instead of console banners
    #[arg(long)]
    pub log_progress: bool,
}

impl RunArgs {
    /// Layers defaults, then the config file, then these flags.
    pub fn resolve(&self, file: FileConfig, default_executor: ExecutorKind) -> anyhow::Result<RunConfig> {
        let mut config = RunConfig {
            executor: default_executor,
            ..RunConfig::default()
        };
        let seed_from_file = file
            .render
            .as_ref()
            .and_then(|render| render.random_seed)
            .is_some();
        config.apply_file(file)?;

        config.grid = self.grid(config.grid)?;
        let params = &mut config.params;
        params.constexpr |= self.constexpr;
        params.max_depth = self.max_depth.unwrap_or(params.max_depth);
        params.num_samples = self.num_samples.unwrap_or(params.num_samples);
        params.random_seed = match self.random_seed {
            Some(seed) => seed,
            None if seed_from_file => params.random_seed,
            None => random_seed(),
        };

        if let Some(workers) = self.max_workers {
            config.workers = workers;
        }
        if let Some(secs) = self.stdout_timeout {
            config.stdout_timeout = seconds("--stdout-timeout", secs, false)?;
        }
        if let Some(secs) = self.kill_grace {
            config.kill_grace = seconds("--kill-grace", secs, true)?;
        }
        if let Some(executor) = self.executor {
            config.executor = executor.into();
        }
        if let Some(launcher) = &self.launcher {
            config.launcher = Launcher::parse(launcher)
                .ok_or_else(|| anyhow::anyhow!("--launcher must name a program"))?;
        }
        if let Some(dir) = &self.source_dir {
            config.source_dir = dir.clone();
        }
        if let Some(dir) = &self.build_root {
            config.build_root = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(path) = &self.composite {
            config.composite_path = path.clone();
        }
        Ok(config)
    }

    fn grid(&self, base: GridSpec) -> Result<GridSpec, GridError> {
        GridSpec::new(
            self.image_width.unwrap_or(base.image_width()),
            self.image_height.unwrap_or(base.image_height()),
            self.patch_width.unwrap_or(base.patch_width()),
            self.patch_height.unwrap_or(base.patch_height()),
        )
    }
}

fn random_seed() -> u32 {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default(),
    );
    hasher.finish() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tessera_core::ConfigError;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tessera").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn both_entry_points_accept_the_same_flags() {
        let flags = ["--image-width", "600", "--max_workers", "4", "--constexpr", "--random-seed", "7"];
        for command in ["compile", "render"] {
            let cli = parse(&[&[command][..], &flags[..]].concat());
            let config = cli
                .command
                .args()
                .resolve(FileConfig::default(), cli.command.default_executor())
                .unwrap();
            assert_eq!(config.grid.image_width(), 600);
            assert_eq!(config.workers, 4);
            assert!(config.params.constexpr);
            assert_eq!(config.params.random_seed, 7);
        }
    }

    #[test]
    fn entry_points_differ_only_in_default_executor() {
        let compile = parse(&["compile"]);
        let render = parse(&["render"]);
        assert_eq!(compile.command.default_executor(), ExecutorKind::Threads);
        assert_eq!(render.command.default_executor(), ExecutorKind::Pool);

        let forced = parse(&["compile", "--executor", "pool"]);
        let config = forced
            .command
            .args()
            .resolve(FileConfig::default(), forced.command.default_executor())
            .unwrap();
        assert_eq!(config.executor, ExecutorKind::Pool);
    }

    #[test]
    fn flags_override_the_config_file() {
        let file: FileConfig = toml::from_str(
            r#"
            workers = 8
            stdout_timeout_secs = 2.5
            executor = "threads"

            [grid]
            image_width = 900
            patch_width = 300

            [render]
            random_seed = 42
            "#,
        )
        .unwrap();
        let cli = parse(&["render", "--max-workers", "2"]);

        let config = cli.command.args().resolve(file, cli.command.default_executor()).unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.stdout_timeout, Duration::from_millis(2500));
        assert_eq!(config.executor, ExecutorKind::Threads);
        assert_eq!(config.grid.image_width(), 900);
        assert_eq!(config.grid.cols(), 3);
        assert_eq!(config.params.random_seed, 42, "a seed from the file is kept");
    }

    #[test]
    fn non_divisible_grid_is_rejected() {
        let cli = parse(&["render", "--image-width", "1000", "--patch-width", "300"]);
        let err = cli
            .command
            .args()
            .resolve(FileConfig::default(), ExecutorKind::Pool)
            .unwrap_err();
        assert!(err.downcast_ref::<GridError>().is_some(), "unexpected error: {err}");
    }

    #[test]
    fn zero_or_negative_timeouts_are_rejected() {
        for flags in [
            &["render", "--stdout-timeout", "0"][..],
            &["render", "--stdout-timeout=-1"][..],
            &["render", "--kill-grace=-0.5"][..],
        ] {
            let cli = parse(flags);
            let err = cli
                .command
                .args()
                .resolve(FileConfig::default(), ExecutorKind::Pool)
                .unwrap_err();
            assert!(err.downcast_ref::<ConfigError>().is_some(), "{flags:?}: {err}");
        }
    }

    #[test]
    fn launcher_flag_is_split_on_whitespace() {
        let cli = parse(&["render", "--launcher", "srun --exclusive bash"]);
        let config = cli
            .command
            .args()
            .resolve(FileConfig::default(), ExecutorKind::Pool)
            .unwrap();
        assert_eq!(config.launcher, Launcher::new("srun", ["--exclusive", "bash"]));
    }
}

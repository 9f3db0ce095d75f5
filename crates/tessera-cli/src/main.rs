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

// Command-line driver for the tessera patch orchestration engine
// Run with: tessera <compile|render> [flags]

mod cli;
mod config;
mod console;
mod helpers;
mod signals;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::Cli;
use console::ConsoleSink;
use helpers::{print_error, print_info};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tessera_io::CmakeScript;
use tessera_runtime::{LogSink, Orchestrator, ProgressSink};

fn main() -> ExitCode {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let args = cli.command.args();
    let file = config::load_config(
        args.config.as_deref(),
        Path::new(config::DEFAULT_CONFIG_FILE),
    )?;
    let config = args
        .resolve(file, cli.command.default_executor())
        .context("Invalid run configuration")?;

    print_info(
        "Grid",
        &format!(
            "{}x{} image in {}x{} patches ({} patches)",
            config.grid.image_width(),
            config.grid.image_height(),
            config.grid.patch_width(),
            config.grid.patch_height(),
            config.grid.patch_count()
        ),
    );
    print_info(
        "Workers",
        &format!(
            "up to {} at once, launched with '{}'",
            config.effective_workers(),
            config.launcher
        ),
    );
    log::debug!("Resolved configuration: {config:?}");

    let template = Arc::new(CmakeScript::new(config.source_dir.clone()));
    let sink: Arc<dyn ProgressSink> = if args.log_progress {
        Arc::new(LogSink)
    } else {
        Arc::new(ConsoleSink::stdout())
    };
    let orchestrator = Orchestrator::new(config, template, sink);
    signals::forward_to(orchestrator.interrupt_handle())
        .context("Failed to install signal handlers")?;
    let report = orchestrator.run()?;

    log::info!(
        "Run finished in {:.2}s (peak of {} live workers)",
        report.elapsed.as_secs_f64(),
        report.peak_live
    );
    if let Some(cancel) = report.cancel {
        if cancel.leaked > 0 {
            log::warn!("{} cancelled workers were still alive at exit", cancel.leaked);
        }
    }
    if report.interrupted {
        bail!("Interrupted; no composite was written");
    }
    if let Some(failure) = report.first_failure {
        bail!("{failure}");
    }
    Ok(())
}

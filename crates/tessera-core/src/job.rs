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

//! Per-patch job descriptions and the script-template seam.

use crate::grid::{GridSpec, PatchCoord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the script artifact written into each patch working directory.
pub const SCRIPT_FILE_NAME: &str = "build.sh";

/// Rendering parameters passed through to the external worker untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderParams {
    /// Number of samples per pixel for anti-aliasing.
    pub num_samples: u32,
    /// Maximum recursion depth of the ray tracer.
    pub max_depth: u32,
    /// Seed for the Monte Carlo estimator.
    pub random_seed: u32,
    /// Whether the worker renders at compile time rather than at run time.
    pub constexpr: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            num_samples: 500,
            max_depth: 50,
            random_seed: 0,
            constexpr: false,
        }
    }
}

/// The external command prefix used to launch a patch script.
///
/// The script path is appended as the final argument, so the default
/// `srun bash` runs `srun bash <work_dir>/build.sh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Launcher {
    /// The program to execute.
    pub program: String,
    /// Arguments placed before the script path.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Launcher {
    /// Creates a launcher from a program and its leading arguments.
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a whitespace-separated command line such as `"srun bash"`.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts))
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new("srun", ["bash"])
    }
}

impl std::fmt::Display for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Everything a script template may need to render one patch's script.
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    /// The patch being rendered.
    pub coord: PatchCoord,
    /// The grid the patch belongs to.
    pub grid: &'a GridSpec,
    /// Pass-through rendering parameters.
    pub params: &'a RenderParams,
    /// The patch's working directory.
    pub work_dir: &'a Path,
    /// Where the worker is expected to write its pixel file.
    pub output_path: &'a Path,
}

/// Produces the text of the script a worker process runs for one patch.
///
/// The orchestration engine never inspects the script; it only persists it
/// and hands its path to the launcher.
pub trait ScriptTemplate: Send + Sync {
    /// Renders the script for a single patch.
    fn render(&self, ctx: &ScriptContext<'_>) -> String;
}

/// The invocation unit for one patch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// The patch this job renders.
    pub coord: PatchCoord,
    /// The patch's working directory, holding its script and build tree.
    pub work_dir: PathBuf,
    /// Path of the persisted script artifact.
    pub script_path: PathBuf,
    /// The generated script text.
    pub script: String,
    /// Pixel file the worker writes.
    pub output_path: PathBuf,
    /// Grid the patch belongs to.
    pub grid: GridSpec,
    /// Pass-through rendering parameters.
    pub params: RenderParams,
}

/// Working directory of a patch under the build root.
pub fn patch_work_dir(build_root: &Path, coord: PatchCoord) -> PathBuf {
    build_root.join(coord.stem())
}

/// Pixel file of a patch under the output directory.
pub fn patch_output_path(output_dir: &Path, coord: PatchCoord) -> PathBuf {
    output_dir.join(format!("{}.ppm", coord.stem()))
}

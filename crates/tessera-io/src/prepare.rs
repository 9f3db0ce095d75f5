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

//! Builds job descriptors and persists their script artifacts.

use crate::error::PrepareError;
use std::fs;
use std::path::Path;
use tessera_core::job::{patch_output_path, patch_work_dir, SCRIPT_FILE_NAME};
use tessera_core::{GridSpec, JobDescriptor, PatchCoord, RenderParams, ScriptContext, ScriptTemplate};

/// Turns patch coordinates into ready-to-launch job descriptors.
pub struct JobBuilder<'a> {
    grid: GridSpec,
    params: RenderParams,
    build_root: &'a Path,
    output_dir: &'a Path,
    template: &'a dyn ScriptTemplate,
}

impl<'a> JobBuilder<'a> {
    /// Creates a builder writing under `build_root` and pointing workers at `output_dir`.
    pub fn new(
        grid: GridSpec,
        params: RenderParams,
        build_root: &'a Path,
        output_dir: &'a Path,
        template: &'a dyn ScriptTemplate,
    ) -> Self {
        Self {
            grid,
            params,
            build_root,
            output_dir,
            template,
        }
    }

    /// Creates the patch working directory and writes its script.
    ///
    /// Safe to call again for the same coordinate: the directory is reused and
    /// the script overwritten.
    pub fn prepare(&self, coord: PatchCoord) -> Result<JobDescriptor, PrepareError> {
        let work_dir = patch_work_dir(self.build_root, coord);
        fs::create_dir_all(&work_dir).map_err(|source| PrepareError::CreateDir {
            coord,
            path: work_dir.clone(),
            source,
        })?;

        let output_path = patch_output_path(self.output_dir, coord);
        let script = self.template.render(&ScriptContext {
            coord,
            grid: &self.grid,
            params: &self.params,
            work_dir: &work_dir,
            output_path: &output_path,
        });

        let script_path = work_dir.join(SCRIPT_FILE_NAME);
        fs::write(&script_path, &script).map_err(|source| PrepareError::WriteScript {
            coord,
            path: script_path.clone(),
            source,
        })?;
        log::debug!("Prepared patch {} in '{}'", coord, work_dir.display());

        Ok(JobDescriptor {
            coord,
            work_dir,
            script_path,
            script,
            output_path,
            grid: self.grid,
            params: self.params,
        })
    }

    /// Prepares every patch of the grid in row-major order, then ensures the
    /// shared output directory exists.
    ///
    /// Stops at the first failure; nothing is launched by this call.
    pub fn prepare_all(&self) -> Result<Vec<JobDescriptor>, PrepareError> {
        let jobs = self
            .grid
            .coords()
            .map(|coord| self.prepare(coord))
            .collect::<Result<Vec<_>, _>>()?;
        fs::create_dir_all(self.output_dir).map_err(|source| PrepareError::SharedDir {
            path: self.output_dir.to_path_buf(),
            source,
        })?;
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTemplate;

    impl ScriptTemplate for EchoTemplate {
        fn render(&self, ctx: &ScriptContext<'_>) -> String {
            format!("echo {} > {}\n", ctx.coord, ctx.output_path.display())
        }
    }

    #[test]
    fn prepare_writes_script_into_patch_directory() {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("build");
        let outputs = dir.path().join("outputs");
        let builder = JobBuilder::new(
            GridSpec::new(4, 2, 2, 1).unwrap(),
            RenderParams::default(),
            &build,
            &outputs,
            &EchoTemplate,
        );

        let job = builder.prepare(PatchCoord::new(1, 0)).unwrap();

        assert_eq!(job.work_dir, build.join("patch_1_0"));
        assert_eq!(job.script_path, build.join("patch_1_0").join("build.sh"));
        assert_eq!(job.output_path, outputs.join("patch_1_0.ppm"));
        assert_eq!(fs::read_to_string(&job.script_path).unwrap(), job.script);
        assert!(job.script.starts_with("echo (1, 0)"));

        // Idempotent on an existing directory.
        let again = builder.prepare(PatchCoord::new(1, 0)).unwrap();
        assert_eq!(again, job);
    }

    #[test]
    fn prepare_all_covers_grid_and_creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("build");
        let outputs = dir.path().join("outputs");
        let builder = JobBuilder::new(
            GridSpec::new(4, 2, 2, 1).unwrap(),
            RenderParams::default(),
            &build,
            &outputs,
            &EchoTemplate,
        );

        let jobs = builder.prepare_all().unwrap();

        let coords: Vec<_> = jobs.iter().map(|j| j.coord).collect();
        assert_eq!(
            coords,
            vec![
                PatchCoord::new(0, 0),
                PatchCoord::new(0, 1),
                PatchCoord::new(1, 0),
                PatchCoord::new(1, 1)
            ]
        );
        assert!(outputs.is_dir());
        assert!(jobs.iter().all(|j| j.script_path.is_file()));
    }

    #[test]
    fn prepare_reports_failing_path() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the build root should be.
        let blocker = dir.path().join("build");
        fs::write(&blocker, b"not a directory").unwrap();
        let outputs = dir.path().join("outputs");
        let builder = JobBuilder::new(
            GridSpec::new(1, 1, 1, 1).unwrap(),
            RenderParams::default(),
            &blocker,
            &outputs,
            &EchoTemplate,
        );

        let err = builder.prepare(PatchCoord::new(0, 0)).unwrap_err();
        assert!(matches!(err, PrepareError::CreateDir { .. }));
        assert!(err.to_string().contains("patch_0_0"));
    }
}

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

//! The default build-and-render script template.

use std::fmt::Write as _;
use std::path::PathBuf;
use tessera_core::{ScriptContext, ScriptTemplate};

/// Configures, compiles, and runs the ray tracer for one patch with CMake.
///
/// Patch parameters are baked in as CMake cache definitions so that, in
/// compile-time mode, the image itself is produced by the compiler.
#[derive(Debug, Clone)]
pub struct CmakeScript {
    source_dir: PathBuf,
}

impl CmakeScript {
    /// Creates a template building the renderer found in `source_dir`.
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }
}

fn banner(script: &mut String, phase: &str) {
    let _ = writeln!(script, "echo {0} {phase} {0}", "-".repeat(32));
    script.push('\n');
}

impl ScriptTemplate for CmakeScript {
    fn render(&self, ctx: &ScriptContext<'_>) -> String {
        let build_dir = ctx.work_dir.join("build");
        let grid = ctx.grid;
        let params = ctx.params;

        let definitions = [
            ("CMAKE_BUILD_TYPE", "Release".to_string()),
            (
                "CONSTEXPR",
                if params.constexpr { "ON" } else { "OFF" }.to_string(),
            ),
            ("IMAGE_WIDTH", grid.image_width().to_string()),
            ("IMAGE_HEIGHT", grid.image_height().to_string()),
            ("PATCH_WIDTH", grid.patch_width().to_string()),
            ("PATCH_HEIGHT", grid.patch_height().to_string()),
            ("PATCH_COORD_X", ctx.coord.row.to_string()),
            ("PATCH_COORD_Y", ctx.coord.col.to_string()),
            ("MAX_DEPTH", params.max_depth.to_string()),
            ("NUM_SAMPLES", params.num_samples.to_string()),
            ("RANDOM_SEED", params.random_seed.to_string()),
            ("OUTPUT_PATH", ctx.output_path.display().to_string()),
        ];

        let mut script = String::from("#!/bin/bash\n\nset -e\n\n");

        banner(&mut script, "CMake");
        script.push_str("cmake \\\n");
        for (name, value) in definitions {
            let _ = writeln!(script, "    -D {name}={value} \\");
        }
        let _ = writeln!(script, "    -S {} \\", self.source_dir.display());
        let _ = writeln!(script, "    -B {}\n", build_dir.display());

        banner(&mut script, "Make");
        let _ = writeln!(script, "cmake --build {}\n", build_dir.display());

        banner(&mut script, "Rendering");
        let _ = writeln!(script, "{}", build_dir.join("ray_tracing").display());

        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tessera_core::{GridSpec, PatchCoord, RenderParams};

    #[test]
    fn script_bakes_in_patch_parameters() {
        let grid = GridSpec::default();
        let params = RenderParams {
            random_seed: 42,
            constexpr: true,
            ..Default::default()
        };
        let ctx = ScriptContext {
            coord: PatchCoord::new(2, 3),
            grid: &grid,
            params: &params,
            work_dir: Path::new("build/patch_2_3"),
            output_path: Path::new("outputs/patch_2_3.ppm"),
        };

        let script = CmakeScript::new("/src/tracer").render(&ctx);

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("-D CONSTEXPR=ON \\"));
        assert!(script.contains("-D PATCH_COORD_X=2 \\"));
        assert!(script.contains("-D PATCH_COORD_Y=3 \\"));
        assert!(script.contains("-D RANDOM_SEED=42 \\"));
        assert!(script.contains("-D OUTPUT_PATH=outputs/patch_2_3.ppm \\"));
        assert!(script.contains("-S /src/tracer \\"));
        assert!(script.contains("cmake --build build/patch_2_3/build"));
        assert!(script.trim_end().ends_with("build/patch_2_3/build/ray_tracing"));

        let cmake = script.find("CMake").unwrap();
        let make = script.find(" Make ").unwrap();
        let render = script.find("Rendering").unwrap();
        assert!(cmake < make && make < render);
    }
}

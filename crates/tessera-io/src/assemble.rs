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

//! Stitches rendered patch images into the final composite.

use crate::error::AssembleError;
use image::{imageops, ImageFormat, RgbImage};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tessera_core::job::patch_output_path;
use tessera_core::{GridSpec, PatchCoord};

/// Loads every patch pixel file of a grid and writes one composite image.
#[derive(Debug, Clone)]
pub struct ImageAssembler {
    grid: GridSpec,
    output_dir: PathBuf,
}

impl ImageAssembler {
    /// Creates an assembler reading patches from `output_dir`.
    pub fn new(grid: GridSpec, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            grid,
            output_dir: output_dir.into(),
        }
    }

    /// Loads and validates a single patch.
    pub fn load_patch(&self, coord: PatchCoord) -> Result<RgbImage, AssembleError> {
        let path = patch_output_path(&self.output_dir, coord);
        if !path.is_file() {
            return Err(AssembleError::MissingPatch { coord, path });
        }
        let patch = image::open(&path)
            .map_err(|source| AssembleError::Decode {
                coord,
                path: path.clone(),
                source,
            })?
            .to_rgb8();

        let (expected_width, expected_height) = (self.grid.patch_width(), self.grid.patch_height());
        if patch.dimensions() != (expected_width, expected_height) {
            return Err(AssembleError::DimensionMismatch {
                coord,
                path,
                expected_width,
                expected_height,
                actual_width: patch.width(),
                actual_height: patch.height(),
            });
        }
        Ok(patch)
    }

    /// Builds the full-resolution image in memory.
    ///
    /// Patches are placed row-major: columns side by side within a row, rows
    /// stacked top to bottom.
    pub fn compose(&self) -> Result<RgbImage, AssembleError> {
        let mut canvas = RgbImage::new(self.grid.image_width(), self.grid.image_height());
        for coord in self.grid.coords() {
            let patch = self.load_patch(coord)?;
            let rect = self.grid.pixel_rect(coord);
            imageops::replace(&mut canvas, &patch, rect.x as i64, rect.y as i64);
        }
        Ok(canvas)
    }

    /// Composes the image and writes it to `destination`.
    ///
    /// The encoded image goes to a temporary file next to the destination and
    /// is renamed into place only once complete, so a failed run never leaves
    /// a partial composite behind. The format follows the file extension and
    /// falls back to PNG.
    pub fn assemble(&self, destination: &Path) -> Result<PathBuf, AssembleError> {
        let canvas = self.compose()?;
        write_atomically(&canvas, destination)?;
        log::info!(
            "Wrote {}x{} composite to '{}'",
            canvas.width(),
            canvas.height(),
            destination.display()
        );
        Ok(destination.to_path_buf())
    }
}

fn write_atomically(canvas: &RgbImage, destination: &Path) -> Result<(), AssembleError> {
    let write_err = |source| AssembleError::Write {
        path: destination.to_path_buf(),
        source,
    };
    let format = ImageFormat::from_path(destination).unwrap_or(ImageFormat::Png);
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(write_err)?;

    let mut staging = tempfile::Builder::new()
        .prefix(".composite-")
        .tempfile_in(parent)
        .map_err(write_err)?;
    {
        let mut writer = BufWriter::new(staging.as_file_mut());
        canvas
            .write_to(&mut writer, format)
            .map_err(|source| AssembleError::Encode {
                path: destination.to_path_buf(),
                source,
            })?;
        writer.flush().map_err(write_err)?;
    }
    staging
        .persist(destination)
        .map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_patch(dir: &Path, coord: PatchCoord, width: u32, height: u32) {
        let color = Rgb([coord.row as u8 * 50, coord.col as u8 * 50, 9]);
        RgbImage::from_pixel(width, height, color)
            .save(patch_output_path(dir, coord))
            .unwrap();
    }

    #[test]
    fn compose_places_patches_row_major() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GridSpec::new(6, 4, 2, 2).unwrap();
        for coord in grid.coords() {
            write_patch(dir.path(), coord, 2, 2);
        }

        let image = ImageAssembler::new(grid, dir.path()).compose().unwrap();

        assert_eq!(image.dimensions(), (6, 4));
        for coord in grid.coords() {
            let rect = grid.pixel_rect(coord);
            for y in rect.y..rect.y + rect.height {
                for x in rect.x..rect.x + rect.width {
                    assert_eq!(
                        image.get_pixel(x, y),
                        &Rgb([coord.row as u8 * 50, coord.col as u8 * 50, 9]),
                        "pixel ({x}, {y}) should come from patch {coord}"
                    );
                }
            }
        }
    }

    #[test]
    fn missing_patch_is_reported_and_nothing_written() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GridSpec::new(4, 2, 2, 2).unwrap();
        write_patch(dir.path(), PatchCoord::new(0, 0), 2, 2);
        let destination = dir.path().join("image.png");

        let err = ImageAssembler::new(grid, dir.path())
            .assemble(&destination)
            .unwrap_err();

        assert!(matches!(
            err,
            AssembleError::MissingPatch { coord, .. } if coord == PatchCoord::new(0, 1)
        ));
        assert!(!destination.exists());
    }

    #[test]
    fn malformed_patch_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GridSpec::new(2, 2, 2, 2).unwrap();
        fs::write(patch_output_path(dir.path(), PatchCoord::new(0, 0)), b"P3\nbroken").unwrap();

        let err = ImageAssembler::new(grid, dir.path()).compose().unwrap_err();
        assert!(matches!(err, AssembleError::Decode { .. }));
    }

    #[test]
    fn wrong_patch_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GridSpec::new(2, 2, 2, 2).unwrap();
        write_patch(dir.path(), PatchCoord::new(0, 0), 3, 2);

        let err = ImageAssembler::new(grid, dir.path()).compose().unwrap_err();
        assert!(matches!(
            err,
            AssembleError::DimensionMismatch {
                actual_width: 3,
                expected_width: 2,
                ..
            }
        ));
    }

    #[test]
    fn assemble_writes_png_without_leftover_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GridSpec::new(4, 4, 2, 2).unwrap();
        for coord in grid.coords() {
            write_patch(dir.path(), coord, 2, 2);
        }
        let destination = dir.path().join("final").join("image.png");

        let written = ImageAssembler::new(grid, dir.path())
            .assemble(&destination)
            .unwrap();

        assert_eq!(written, destination);
        let reloaded = image::open(&destination).unwrap().to_rgb8();
        assert_eq!(reloaded.dimensions(), (4, 4));
        assert_eq!(reloaded.get_pixel(3, 3), &Rgb([50, 50, 9]));

        let leftovers: Vec<_> = fs::read_dir(destination.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".composite-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

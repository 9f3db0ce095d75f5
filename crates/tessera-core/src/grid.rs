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

//! Partitioning of the full image into a grid of independently rendered patches.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one cell of the patch grid.
///
/// A coordinate uniquely determines the pixel sub-rectangle a patch covers and
/// the name of the file its worker produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchCoord {
    /// Row index, counted from the top of the image.
    pub row: u32,
    /// Column index, counted from the left of the image.
    pub col: u32,
}

impl PatchCoord {
    /// Creates a coordinate from a row and a column index.
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// The stem shared by the patch's working directory and output file.
    pub fn stem(&self) -> String {
        format!("patch_{}_{}", self.row, self.col)
    }
}

impl fmt::Display for PatchCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// A pixel rectangle inside the full image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// Left edge, in pixels.
    pub x: u32,
    /// Top edge, in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// An error raised when image and patch dimensions cannot form a grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// One of the dimensions is zero.
    ZeroDimension {
        /// Which dimension was zero.
        field: &'static str,
    },
    /// The image dimension is not a multiple of the patch dimension.
    NotDivisible {
        /// Which axis failed ("width" or "height").
        axis: &'static str,
        /// The image size along that axis.
        image: u32,
        /// The patch size along that axis.
        patch: u32,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::ZeroDimension { field } => {
                write!(f, "{field} must be greater than zero")
            }
            GridError::NotDivisible { axis, image, patch } => {
                write!(
                    f,
                    "image {axis} {image} is not a multiple of patch {axis} {patch} \
                     ({} remainder pixels would be dropped)",
                    image % patch
                )
            }
        }
    }
}

impl std::error::Error for GridError {}

/// Image and patch dimensions, validated to tile exactly.
///
/// Construction rejects zero sizes and any patch size that does not evenly
/// divide the image, so every pixel belongs to exactly one patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridDimensions")]
pub struct GridSpec {
    image_width: u32,
    image_height: u32,
    patch_width: u32,
    patch_height: u32,
}

/// Unvalidated grid dimensions, as they come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDimensions {
    /// Full image width in pixels.
    pub image_width: u32,
    /// Full image height in pixels.
    pub image_height: u32,
    /// Patch width in pixels.
    pub patch_width: u32,
    /// Patch height in pixels.
    pub patch_height: u32,
}

impl Default for GridDimensions {
    fn default() -> Self {
        Self {
            image_width: 1200,
            image_height: 800,
            patch_width: 300,
            patch_height: 200,
        }
    }
}

impl TryFrom<GridDimensions> for GridSpec {
    type Error = GridError;

    fn try_from(dims: GridDimensions) -> Result<Self, Self::Error> {
        GridSpec::new(
            dims.image_width,
            dims.image_height,
            dims.patch_width,
            dims.patch_height,
        )
    }
}

impl From<GridSpec> for GridDimensions {
    fn from(spec: GridSpec) -> Self {
        Self {
            image_width: spec.image_width,
            image_height: spec.image_height,
            patch_width: spec.patch_width,
            patch_height: spec.patch_height,
        }
    }
}

impl GridSpec {
    /// Validates the dimensions and builds a grid.
    pub fn new(
        image_width: u32,
        image_height: u32,
        patch_width: u32,
        patch_height: u32,
    ) -> Result<Self, GridError> {
        for (field, value) in [
            ("image width", image_width),
            ("image height", image_height),
            ("patch width", patch_width),
            ("patch height", patch_height),
        ] {
            if value == 0 {
                return Err(GridError::ZeroDimension { field });
            }
        }
        if image_width % patch_width != 0 {
            return Err(GridError::NotDivisible {
                axis: "width",
                image: image_width,
                patch: patch_width,
            });
        }
        if image_height % patch_height != 0 {
            return Err(GridError::NotDivisible {
                axis: "height",
                image: image_height,
                patch: patch_height,
            });
        }
        Ok(Self {
            image_width,
            image_height,
            patch_width,
            patch_height,
        })
    }

    /// Full image width in pixels.
    pub fn image_width(&self) -> u32 {
        self.image_width
    }

    /// Full image height in pixels.
    pub fn image_height(&self) -> u32 {
        self.image_height
    }

    /// Patch width in pixels.
    pub fn patch_width(&self) -> u32 {
        self.patch_width
    }

    /// Patch height in pixels.
    pub fn patch_height(&self) -> u32 {
        self.patch_height
    }

    /// Number of patch rows.
    pub fn rows(&self) -> u32 {
        self.image_height / self.patch_height
    }

    /// Number of patch columns.
    pub fn cols(&self) -> u32 {
        self.image_width / self.patch_width
    }

    /// Total number of patches.
    pub fn patch_count(&self) -> usize {
        self.rows() as usize * self.cols() as usize
    }

    /// Enumerates every coordinate in row-major order.
    pub fn coords(&self) -> impl Iterator<Item = PatchCoord> + '_ {
        let cols = self.cols();
        (0..self.rows()).flat_map(move |row| (0..cols).map(move |col| PatchCoord::new(row, col)))
    }

    /// Returns `true` if the coordinate lies inside the grid.
    pub fn contains(&self, coord: PatchCoord) -> bool {
        coord.row < self.rows() && coord.col < self.cols()
    }

    /// The pixel rectangle covered by a patch.
    pub fn pixel_rect(&self, coord: PatchCoord) -> PixelRect {
        PixelRect {
            x: coord.col * self.patch_width,
            y: coord.row * self.patch_height,
            width: self.patch_width,
            height: self.patch_height,
        }
    }
}

impl Default for GridSpec {
    fn default() -> Self {
        let dims = GridDimensions::default();
        Self {
            image_width: dims.image_width,
            image_height: dims.image_height,
            patch_width: dims.patch_width,
            patch_height: dims.patch_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_grid_is_four_by_four() {
        let grid = GridSpec::default();
        assert_eq!(grid.rows(), 4);
        assert_eq!(grid.cols(), 4);

        let coords: Vec<_> = grid.coords().collect();
        assert_eq!(coords.len(), 16);
        assert_eq!(coords.first(), Some(&PatchCoord::new(0, 0)));
        assert_eq!(coords[1], PatchCoord::new(0, 1));
        assert_eq!(coords[4], PatchCoord::new(1, 0));
        assert_eq!(coords.last(), Some(&PatchCoord::new(3, 3)));
    }

    #[test]
    fn coords_cover_grid_without_gaps_or_duplicates() {
        for (w, h, pw, ph) in [(1, 1, 1, 1), (64, 48, 16, 8), (90, 30, 30, 10), (7, 5, 7, 1)] {
            let grid = GridSpec::new(w, h, pw, ph).unwrap();
            let coords: Vec<_> = grid.coords().collect();
            let unique: HashSet<_> = coords.iter().copied().collect();

            assert_eq!(coords.len(), ((h / ph) * (w / pw)) as usize);
            assert_eq!(unique.len(), coords.len());
            assert!(coords.iter().all(|c| grid.contains(*c)));

            let covered: u64 = coords
                .iter()
                .map(|c| {
                    let r = grid.pixel_rect(*c);
                    r.width as u64 * r.height as u64
                })
                .sum();
            assert_eq!(covered, w as u64 * h as u64);
        }
    }

    #[test]
    fn pixel_rect_offsets_by_row_and_column() {
        let grid = GridSpec::default();
        let rect = grid.pixel_rect(PatchCoord::new(2, 1));
        assert_eq!(
            rect,
            PixelRect {
                x: 300,
                y: 400,
                width: 300,
                height: 200
            }
        );
    }

    #[test]
    fn uneven_dimensions_are_rejected() {
        let err = GridSpec::new(1000, 800, 300, 200).unwrap_err();
        assert_eq!(
            err,
            GridError::NotDivisible {
                axis: "width",
                image: 1000,
                patch: 300
            }
        );
        assert!(err.to_string().contains("100 remainder pixels"));

        // A dimension smaller than its patch would yield zero patches.
        assert!(matches!(
            GridSpec::new(1200, 100, 300, 200),
            Err(GridError::NotDivisible { axis: "height", .. })
        ));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert_eq!(
            GridSpec::new(1200, 800, 0, 200),
            Err(GridError::ZeroDimension {
                field: "patch width"
            })
        );
        assert!(GridSpec::new(0, 800, 300, 200).is_err());
    }

    #[test]
    fn stem_names_row_then_column() {
        assert_eq!(PatchCoord::new(1, 2).stem(), "patch_1_2");
        assert_eq!(PatchCoord::new(1, 2).to_string(), "(1, 2)");
    }
}

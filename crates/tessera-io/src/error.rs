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

//! Error types for filesystem preparation and image assembly.

use std::path::PathBuf;
use tessera_core::PatchCoord;
use thiserror::Error;

/// Failure while preparing a patch's working directory or script.
#[derive(Debug, Error)]
pub enum PrepareError {
    /// A directory could not be created.
    #[error("patch {coord}: failed to create directory '{}': {source}", path.display())]
    CreateDir {
        /// The patch being prepared.
        coord: PatchCoord,
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The script artifact could not be written.
    #[error("patch {coord}: failed to write script '{}': {source}", path.display())]
    WriteScript {
        /// The patch being prepared.
        coord: PatchCoord,
        /// The script path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A shared directory (for example the output directory) could not be created.
    #[error("failed to create directory '{}': {source}", path.display())]
    SharedDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Failure while assembling patch images into the composite.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// A patch pixel file is missing.
    #[error("patch {coord}: pixel file '{}' not found", path.display())]
    MissingPatch {
        /// The patch whose file is missing.
        coord: PatchCoord,
        /// Expected location of the file.
        path: PathBuf,
    },
    /// A patch pixel file could not be decoded.
    #[error("patch {coord}: failed to decode '{}': {source}", path.display())]
    Decode {
        /// The patch whose file is malformed.
        coord: PatchCoord,
        /// The file path.
        path: PathBuf,
        /// The decoder error.
        #[source]
        source: image::ImageError,
    },
    /// A patch decoded to the wrong size.
    #[error(
        "patch {coord}: '{}' is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}",
        path.display()
    )]
    DimensionMismatch {
        /// The offending patch.
        coord: PatchCoord,
        /// The file path.
        path: PathBuf,
        /// Expected width.
        expected_width: u32,
        /// Expected height.
        expected_height: u32,
        /// Decoded width.
        actual_width: u32,
        /// Decoded height.
        actual_height: u32,
    },
    /// The composite could not be encoded.
    #[error("failed to encode composite '{}': {source}", path.display())]
    Encode {
        /// Destination path.
        path: PathBuf,
        /// The encoder error.
        #[source]
        source: image::ImageError,
    },
    /// Filesystem failure while writing or finalizing the composite.
    #[error("failed to write composite '{}': {source}", path.display())]
    Write {
        /// Destination path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

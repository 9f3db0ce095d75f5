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

//! # Tessera IO
//!
//! Filesystem side of a run: preparing per-patch working directories and
//! scripts, and assembling rendered patches into the composite image.

#![warn(missing_docs)]

pub mod assemble;
pub mod error;
pub mod prepare;
pub mod script;

pub use assemble::ImageAssembler;
pub use error::{AssembleError, PrepareError};
pub use prepare::JobBuilder;
pub use script::CmakeScript;

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

//! # Tessera Core
//!
//! Foundational crate for the patch orchestration engine: the grid
//! partitioner, the job data model, and the run configuration.

#![warn(missing_docs)]

pub mod config;
pub mod grid;
pub mod job;
pub mod outcome;

pub use config::{ConfigError, ExecutorKind, FileConfig, RunConfig};
pub use grid::{GridError, GridSpec, PatchCoord, PixelRect};
pub use job::{JobDescriptor, Launcher, RenderParams, ScriptContext, ScriptTemplate};
pub use outcome::{JobOutcome, JobStatus};

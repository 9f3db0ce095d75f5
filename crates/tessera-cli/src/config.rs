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

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tessera_core::FileConfig;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Tessera.toml";

/// Loads the run configuration file.
///
/// An explicitly requested file must exist. Without one, `default_path` is
/// used when present and defaults apply otherwise.
pub fn load_config(explicit: Option<&Path>, default_path: &Path) -> Result<FileConfig> {
    let config_path = match explicit {
        Some(path) => path,
        None if default_path.exists() => default_path,
        None => {
            log::info!(
                "No '{}' found. Using default configuration.",
                default_path.display()
            );
            return Ok(FileConfig::default());
        }
    };

    log::info!("Found '{}'. Loading configuration.", config_path.display());
    let config_str = fs::read_to_string(config_path).with_context(|| {
        format!(
            "Failed to read configuration file at '{}'",
            config_path.display()
        )
    })?;
    let config = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse TOML from '{}'", config_path.display()))?;
    Ok(config)
}

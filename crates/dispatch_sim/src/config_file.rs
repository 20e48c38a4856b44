//! Loading [`DispatchConfig`] from a JSON file.

use std::fs;
use std::path::Path;

use anyhow::Context;
use dispatch_core::config::DispatchConfig;

/// Read and validate a config file, or fall back to defaults when no path
/// is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<DispatchConfig> {
    let Some(path) = path else {
        return Ok(DispatchConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    DispatchConfig::from_json_str(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))
}

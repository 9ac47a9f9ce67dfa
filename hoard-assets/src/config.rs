use std::path::Path;

use hoard_util::eyre::{Result, WrapErr};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Upper bound on asset records in the `Loading` state at once.
    pub max_concurrent_loads: usize,
    /// Size of the runtime running fetches.
    pub worker_threads: usize,
    /// Missing metadata yields a placeholder instead of an error.
    pub development: bool,
}

impl Default for AssetsConfig {
    fn default() -> AssetsConfig {
        AssetsConfig {
            max_concurrent_loads: 5,
            worker_threads: 4,
            development: cfg!(debug_assertions),
        }
    }
}

impl AssetsConfig {
    pub fn from_json(data: &str) -> Result<AssetsConfig> {
        serde_json::from_str(data).wrap_err("invalid asset config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<AssetsConfig> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read {}", path.display()))?;
        Self::from_json(&data)
    }
}

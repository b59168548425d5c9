// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{FlowConfig, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Rejects zero timeouts, periods, batch sizes and pool sizes.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<FlowConfig> {
    let raw_config = load_from_path(&path)?;
    let config = FlowConfig::try_from(raw_config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to validated defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<FlowConfig> {
    let path = path.as_ref();
    if path.exists() {
        load_and_validate(path)
    } else {
        FlowConfig::try_from(RawConfigFile::default())
    }
}

/// Default config location: `Flowdag.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Flowdag.toml")
}

pub mod config;

pub use config::ConfigStorage;

use std::path::PathBuf;

pub fn get_config_dir() -> crate::Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("subtimer"))
        .ok_or_else(|| crate::Error::InvalidData("Could not find config directory".to_string()))
}

pub fn default_config_path() -> crate::Result<PathBuf> {
    Ok(get_config_dir()?.join("config.json"))
}

//! Path utilities for heapsift's data directory

use std::path::PathBuf;

/// Get the heapsift data directory (~/.heapsift)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".heapsift"))
        .unwrap_or_else(|| PathBuf::from(".heapsift"))
}

/// Get the config file path (~/.heapsift/config.toml)
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

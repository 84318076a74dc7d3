//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Default capacity of the input channel feeding the dispatcher
pub const DEFAULT_INPUT_QUEUE: usize = 32;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Keymap file; the built-in layout is used when it does not exist
    pub keymap_path: PathBuf,

    /// Capacity of the input channel
    pub input_queue: usize,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("sticky-modifiers");

        let socket_path = std::env::var_os("STICKY_MODIFIERS_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let keymap_path = std::env::var_os("STICKY_MODIFIERS_KEYMAP")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("keymap.json"));

        let input_queue = match std::env::var("STICKY_MODIFIERS_INPUT_QUEUE") {
            Ok(value) => parse_queue(&value)?,
            Err(_) => DEFAULT_INPUT_QUEUE,
        };

        Ok(Self {
            socket_path,
            data_dir,
            keymap_path,
            input_queue,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn parse_queue(value: &str) -> Result<usize> {
    let queue: usize = value
        .trim()
        .parse()
        .with_context(|| format!("invalid STICKY_MODIFIERS_INPUT_QUEUE: {value:?}"))?;
    anyhow::ensure!(queue > 0, "STICKY_MODIFIERS_INPUT_QUEUE must be positive");
    Ok(queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.data_dir.to_string_lossy().contains("sticky-modifiers"));
        assert!(config.input_queue > 0);
    }

    #[test]
    fn test_parse_queue() {
        assert_eq!(parse_queue("64").unwrap(), 64);
        assert_eq!(parse_queue(" 8 ").unwrap(), 8);
        assert!(parse_queue("0").is_err());
        assert!(parse_queue("many").is_err());
    }
}

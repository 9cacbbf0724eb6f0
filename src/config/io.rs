use std::path::Path;
use std::str;
use log::info;
use serde_json;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::config::types::SessionConfig;
use crate::error::ConfigError;

pub async fn read_config(path: &Path) -> Result<SessionConfig, ConfigError> {
    info!("Reading config file {}", path.to_string_lossy());
    let mut file = File::open(path).await?;

    let mut content = vec![];
    file.read_to_end(&mut content).await?;

    if content.is_empty() {
        return Ok(SessionConfig::default());
    }

    let content = str::from_utf8(&content)?;

    let config: SessionConfig = serde_json::from_str(content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_config(name: &str, content: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("userdata-ble-{}-{}.json", std::process::id(), name));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn empty_file_gives_defaults() {
        let path = temp_config("empty", b"");

        assert_eq!(read_config(&path).await.unwrap(), SessionConfig::default());
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn reads_scan_dwell() {
        let path = temp_config("dwell", br#"{"scanDwellMs": 250}"#);

        assert_eq!(read_config(&path).await.unwrap().scan_dwell_ms, 250);
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn invalid_json_is_a_json_error() {
        let path = temp_config("invalid", b"{ not json");

        assert!(matches!(read_config(&path).await, Err(ConfigError::JsonError { .. })));
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join("userdata-ble-does-not-exist.json");

        assert!(matches!(read_config(&path).await, Err(ConfigError::IOError { .. })));
    }
}

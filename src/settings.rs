//! Platform directories for logs and persisted credentials.

use anyhow::Result;
use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the path to the log directory.
pub fn log_directory(log_dir: &str) -> PathBuf {
    let base = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir);
    base.join(log_dir).join("logs")
}

/// Initialize the log directory.
pub fn init_log_directory(log_dir: &str) -> Result<PathBuf> {
    let path = log_directory(log_dir);
    if !path.exists() {
        std::fs::create_dir_all(&path)?;
    }
    Ok(path)
}

/// Get the path of the credential file.
///
/// Returns `~/.config/mailconsole/credentials.json` on Linux and
/// `~/Library/Application Support/dev.mailconsole.mailconsole/credentials.json` on macOS.
pub fn credentials_path(file_name: &str) -> Option<PathBuf> {
    ProjectDirs::from("dev", "mailconsole", "mailconsole")
        .map(|dirs| dirs.config_dir().join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory() {
        let path = log_directory("mailconsole");
        assert!(path.to_string_lossy().contains("mailconsole"));
        assert!(path.ends_with("logs"));
    }

    #[test]
    fn test_credentials_path() {
        if let Some(path) = credentials_path("credentials.json") {
            assert!(path.ends_with("credentials.json"));
        }
    }
}

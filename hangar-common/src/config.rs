//! Configuration loading and database path resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Database path resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_database_path(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = load_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(db_path) = config.get("database_path").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(db_path));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(get_default_data_folder().join("hangar.db"))
}

/// Get default configuration file path for the platform
fn load_config_file() -> Result<PathBuf> {
    let config_path = if cfg!(target_os = "linux") {
        // Try ~/.config/hangar/config.toml first, then /etc/hangar/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("hangar").join("config.toml"));
        let system_config = PathBuf::from("/etc/hangar/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    } else {
        dirs::config_dir()
            .map(|d| d.join("hangar").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?
    };

    if config_path.exists() {
        Ok(config_path)
    } else {
        Err(Error::Config(format!(
            "Config file not found: {:?}",
            config_path
        )))
    }
}

/// Get OS-dependent default data folder path
fn get_default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("hangar"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/hangar"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("hangar"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/hangar"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("hangar"))
            .unwrap_or_else(|| PathBuf::from("hangar-data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arg_takes_priority() {
        let path = resolve_database_path(Some("/tmp/cli.db"), "HANGAR_TEST_DB_UNSET").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/cli.db"));
    }

    #[test]
    fn test_env_var_used_when_no_cli_arg() {
        std::env::set_var("HANGAR_TEST_DB_PRIO", "/tmp/env.db");
        let path = resolve_database_path(None, "HANGAR_TEST_DB_PRIO").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/env.db"));
        std::env::remove_var("HANGAR_TEST_DB_PRIO");
    }

    #[test]
    fn test_fallback_yields_some_path() {
        let path = resolve_database_path(None, "HANGAR_TEST_DB_UNSET").unwrap();
        assert!(path.to_string_lossy().ends_with("hangar.db"));
    }
}

//! Workspace initialization utilities for tests

use assert_fs::TempDir;
use grant_config::Config;
use std::fs;

/// Temporary directory, removed on drop
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Temp workspace with a default `.grantsync/config.toml`
///
/// The remote endpoint points at a port nothing listens on, so commands
/// run against it behave as if the network were down.
pub fn init_workspace() -> TempDir {
    workspace_with_config(
        "[remote]\nbase_url = \"http://127.0.0.1:9/api\"\ntimeout_ms = 2000\n",
    )
}

/// Temp workspace with the given config file contents
pub fn workspace_with_config(toml: &str) -> TempDir {
    let temp = temp_dir();
    let config_path = Config::path_for(temp.path());
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).expect("Failed to create .grantsync directory");
    }
    fs::write(&config_path, toml).expect("Failed to write config.toml");
    temp
}

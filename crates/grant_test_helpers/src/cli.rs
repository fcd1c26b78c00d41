//! CLI command builders for tests

use assert_cmd::Command;

/// `grant` binary with a clean environment
///
/// - `RUST_LOG=error` keeps INFO/DEBUG lines out of assertions on stderr
/// - `GRANT_WORKSPACE` is removed so the user's workspace is never touched
#[allow(deprecated)]
pub fn grant_command() -> Command {
    command_for("grant")
}

/// Any workspace binary with a clean environment
#[allow(deprecated)]
pub fn command_for(bin_name: &str) -> Command {
    let mut cmd = Command::cargo_bin(bin_name)
        .unwrap_or_else(|_| panic!("Failed to find {} binary", bin_name));
    cmd.env("RUST_LOG", "error");
    cmd.env_remove("GRANT_WORKSPACE");
    cmd
}

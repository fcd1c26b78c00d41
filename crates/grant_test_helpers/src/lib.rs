//! Shared test utilities for GrantSync test suites
//!
//! # Modules
//!
//! - [`clock`]: hand-driven clock
//! - [`scheduler`]: scheduler whose timers only fire when a test says so
//! - [`store`]: remote store wrapper with fault injection
//! - [`workspace`]: temp workspaces with a `.grantsync` directory
//! - [`cli`]: command builders with pre-configured environments
//! - [`logging`]: test logging configuration
//! - [`assertions`]: predicates over CLI output
//!
//! # Example
//!
//! ```rust
//! use grant_test_helpers::prelude::*;
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::new(1_000));
//! clock.advance_millis(500);
//! assert_eq!(grant_common::Clock::now_millis(clock.as_ref()), 1_500);
//! ```

pub mod assertions;
pub mod cli;
pub mod clock;
pub mod logging;
pub mod scheduler;
pub mod store;
pub mod workspace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::cli::{command_for, grant_command};
    pub use crate::clock::ManualClock;
    pub use crate::logging::{init_test_logging, suppress_logs};
    pub use crate::scheduler::ManualScheduler;
    pub use crate::store::FaultyStore;
    pub use crate::workspace::{init_workspace, temp_dir, workspace_with_config};
}

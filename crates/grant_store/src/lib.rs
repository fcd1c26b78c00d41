//! # GrantSync storage backends
//!
//! Both subsystems sit in front of the same two stores:
//!
//! - [`RemoteStore`]: the organisation's key-value settings endpoint. Every
//!   call is a network round-trip and may fail at any time.
//!   [`HttpRemoteStore`] talks to the real endpoint, [`MemoryRemoteStore`]
//!   keeps everything in process.
//! - [`LocalStorage`]: small, synchronous, durable key-value storage private
//!   to one installation. [`FileStorage`] keeps one file per key,
//!   [`MemoryStorage`] is volatile.

pub mod http;
pub mod local;
pub mod memory;
pub mod remote;

pub use http::HttpRemoteStore;
pub use local::{FileStorage, LocalStorage, MemoryStorage};
pub use memory::MemoryRemoteStore;
pub use remote::{RemoteStore, Scope};

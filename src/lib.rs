//! # zk-framework
//!
//! A resilient client framework for hierarchical coordination services.
//!
//! - [`Framework`] owns the session, tracks its state and reconnects on loss
//! - [`Operations`] runs deadline-bounded CRUD calls under a namespace
//! - [`WatchManager`] keeps continuous watches alive across session loss
//! - [`Cache`] keeps node data in memory with bounded size and eviction,
//!   refreshed through watches
//!
//! The wire protocol is abstracted behind [`Connector`] and [`Session`];
//! [`MemoryEnsemble`] is an in-process implementation.

mod cache;
mod config;
mod constants;
mod errors;
mod framework;
mod metrics;
mod operation;
mod session;
pub mod utils;
mod watcher;

pub use cache::*;
pub use config::*;
pub use constants::*;
pub use errors::*;
pub use framework::*;
pub use metrics::*;
pub use operation::*;
pub use session::*;
pub use utils::*;
pub use watcher::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

//! Fixtures shared by the unit tests of every module
mod common;
mod listener;
mod mock;

pub use common::*;
pub use listener::*;
pub use mock::*;

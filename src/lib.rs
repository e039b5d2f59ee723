//! Watch-and-publish client for an etcd v3 store over mutual TLS.
//!
//! One [`Connection`] is shared by a [`ChangeWatcher`], which delivers
//! every change under a key prefix to a handler, and a
//! [`PeriodicPublisher`], which writes an increasing counter to the same
//! key. [`App`] wires both and tears them down on shutdown.

mod app;
mod client;
mod config;
mod constants;
mod errors;
mod event;
pub mod handler;
pub mod metrics;
pub mod proto;
mod publisher;
mod utils;
mod watcher;

pub use app::*;
pub use client::*;
pub use config::*;
pub use constants::DEFAULT_KEY;
pub use errors::*;
pub use event::*;
pub use publisher::*;
pub use utils::*;
pub use watcher::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

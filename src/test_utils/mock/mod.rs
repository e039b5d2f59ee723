//! In-process store for tests
//!
//! [`MockStore`] implements the generated `KV` and `Watch` services over an
//! in-memory revision log; [`MockNode`] serves it on an ephemeral port,
//! optionally behind mutual TLS.
//!
//! Fault injection:
//! - [`MockStore::fail_next_puts`] answers the next puts with `UNAVAILABLE`
//! - [`MockStore::reset_streams`] aborts every open watch stream

mod mock_node;
mod mock_store;

pub use mock_node::*;
pub use mock_store::*;

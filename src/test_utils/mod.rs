//! Shared fixtures for unit and end-to-end tests: a throwaway PKI and an
//! in-process store speaking the KV/Watch subset.
mod common;
mod mock;

pub use common::*;
pub use mock::*;

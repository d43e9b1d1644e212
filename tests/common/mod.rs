//! Common test utilities for gfs-fetch integration tests

#[allow(dead_code)]
pub mod archive;

pub use archive::*;

//! Application bridge service
//!
//! Configuration and the health/metrics HTTP surface of the `app-bridge`
//! binary, split out so integration tests can drive the real router.

pub mod api;
pub mod config;

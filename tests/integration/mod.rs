//! Integration tests for faktory
//!
//! This module contains integration tests that run whole conversions against
//! images written to disk, and the docker source when the `docker` feature
//! is enabled.

pub mod convert;
pub mod docker;
pub mod store;

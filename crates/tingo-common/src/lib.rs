//! Common utilities for tingo
//!
//! This crate provides the error taxonomy shared by the driver and its callers.

pub mod error;

pub use error::{DriverError, Result};

//! Shared domain types for the ccsdk gateway: the error taxonomy and the
//! environment-driven configuration.

pub mod config;
pub mod error;

pub use config::{Config, PermissionMode};
pub use error::{Error, Result};

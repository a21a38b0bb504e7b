//! Common utilities and types shared across filedeck crates.
//!
//! This module provides the error type every layer reports through and the
//! identifier/secret newtypes exchanged with the file server.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{EntryId, SecretString};

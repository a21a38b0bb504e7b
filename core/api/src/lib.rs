//! File server API layer for filedeck.
//!
//! This module provides a trait-based interface to the remote file server
//! (HTTP in production, in-memory for tests) together with the wire types,
//! bearer-token handling and upload progress plumbing they share.
//!
//! # Design Principles
//! - One request per call: no retries, no timeouts layered on top
//! - Server error messages are preserved for inline display
//! - Uploads stream their body and report byte-level progress

pub mod auth;
pub mod http;
pub mod memory;
pub mod progress;
pub mod server;
pub mod wire;

pub use auth::{AuthToken, FileTokenStore, MemoryTokenStore, TokenStore, TOKEN_KEY};
pub use http::{encode_segment, ClientConfig, HttpServer};
pub use memory::MemoryServer;
pub use progress::{ByteStream, ProgressFn, UploadSource};
pub use server::FileServer;
pub use wire::{EntryUpdate, RemoteDirectory, RemoteEntry, ServerConfig};

//! HTTP backend for the file server API.
//!
//! This module provides the `reqwest` implementation of [`FileServer`]:
//! - JSON envelope decoding with the server's error messages preserved
//! - Bearer token injection on every request once a token is installed
//! - Streaming multipart uploads with byte-level progress
//!
//! [`FileServer`]: crate::server::FileServer

pub mod client;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};

pub use client::HttpServer;

/// Default server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:2525";

/// Characters escaped inside a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-encode `segment` for use as one path component.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Scheme, host and port of the server, e.g. `http://localhost:2525`.
    pub base_url: String,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    format!("filedeck/{}", env!("CARGO_PKG_VERSION"))
}

impl ClientConfig {
    /// Configuration for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

//! Shared application context.

use std::sync::Arc;

use filedeck_api::FileServer;

use crate::events::EventBus;
use crate::interceptor::ReauthGuard;

/// Everything the components share: base URL, server handle, event bus.
///
/// Built once per application instance. The server handle is wrapped in
/// a [`ReauthGuard`] so every component gets re-auth signalling.
#[derive(Clone)]
pub struct AppContext {
    base_url: String,
    server: Arc<dyn FileServer>,
    events: EventBus,
}

impl AppContext {
    pub fn new(base_url: impl Into<String>, server: Arc<dyn FileServer>) -> Self {
        let events = EventBus::new();
        let server: Arc<dyn FileServer> = Arc::new(ReauthGuard::new(server, events.clone()));
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            server,
            events,
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn server(&self) -> &Arc<dyn FileServer> {
        &self.server
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

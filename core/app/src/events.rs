//! Typed application events.
//!
//! Handlers registered with [`EventBus::on`] run synchronously inside
//! [`EventBus::publish`]; they must not block. Asynchronous observers
//! use [`EventBus::subscribe`] instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use filedeck_common::{EntryId, Error, Result};

/// Broadcast capacity for async subscribers.
const CHANNEL_CAPACITY: usize = 64;

/// Something that happened in the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The server demanded authentication; the login prompt should open.
    LoginRequired,
    /// The authenticated flag changed.
    AuthChanged { authenticated: bool },
    /// A listing replaced the current directory.
    DirectoryLoaded { id: EntryId, entries: usize },
    /// The set of selected entries changed.
    SelectionChanged { selected: usize },
    /// An upload task was created.
    UploadStarted { file_name: String },
    /// An upload task reached success or terminal failure.
    UploadSettled { file_name: String, succeeded: bool },
    /// The session was discarded; the client must be rebuilt.
    ReloadRequested,
}

type Handler = Arc<dyn Fn(&AppEvent) + Send + Sync>;

struct Inner {
    tx: broadcast::Sender<AppEvent>,
    handlers: RwLock<Vec<Handler>>,
    closed: AtomicBool,
}

/// Event bus scoped to one application instance.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create an open bus with no handlers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                tx,
                handlers: RwLock::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a synchronous handler.
    ///
    /// Handlers may publish further events.
    pub fn on(&self, handler: impl Fn(&AppEvent) + Send + Sync + 'static) {
        if self.is_closed() {
            return;
        }
        self.inner
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(handler));
    }

    /// Receive events asynchronously.
    ///
    /// # Errors
    /// - `NotPermitted` once the bus is closed
    pub fn subscribe(&self) -> Result<broadcast::Receiver<AppEvent>> {
        if self.is_closed() {
            return Err(Error::NotPermitted("Event bus is closed".to_string()));
        }
        Ok(self.inner.tx.subscribe())
    }

    /// Deliver `event` to every handler, then to async subscribers.
    ///
    /// Publishing on a closed bus is a no-op.
    pub fn publish(&self, event: AppEvent) {
        if self.is_closed() {
            debug!("Dropping {:?} on closed bus", event);
            return;
        }
        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for handler in handlers {
            handler(&event);
        }
        // no subscribers is fine
        let _ = self.inner.tx.send(event);
    }

    /// Drop every handler and refuse further events.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

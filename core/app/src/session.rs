//! Session state: bearer token, authenticated flag and the login prompt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use filedeck_api::{AuthToken, FileServer, ServerConfig, TokenStore};
use filedeck_common::{Result, SecretString};

use crate::context::AppContext;
use crate::events::{AppEvent, EventBus};

/// Outcome of validating a persisted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Authenticated,
    Unauthenticated,
}

/// Open/closed state of the login prompt.
///
/// Opening an open prompt does nothing.
#[derive(Debug, Clone, Default)]
pub struct LoginPrompt {
    open: Arc<AtomicBool>,
}

impl LoginPrompt {
    /// Open the prompt. Returns `false` if it was already open.
    pub fn open(&self) -> bool {
        !self.open.swap(true, Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Session {
    token: Option<AuthToken>,
    authenticated: bool,
}

/// Owns the token and the authenticated flag.
///
/// Cloning yields a handle to the same session.
#[derive(Clone)]
pub struct SessionManager {
    server: Arc<dyn FileServer>,
    store: Arc<dyn TokenStore>,
    events: EventBus,
    state: Arc<Mutex<Session>>,
    prompt: LoginPrompt,
}

impl SessionManager {
    /// Create a session bound to `ctx`.
    ///
    /// Registers the handler that opens the login prompt whenever the
    /// server demands authentication.
    pub fn new(ctx: &AppContext, store: Arc<dyn TokenStore>) -> Self {
        let prompt = LoginPrompt::default();
        let handle = prompt.clone();
        ctx.events().on(move |event| {
            if *event == AppEvent::LoginRequired && handle.open() {
                info!("Login prompt opened");
            }
        });

        Self {
            server: ctx.server().clone(),
            store,
            events: ctx.events().clone(),
            state: Arc::new(Mutex::new(Session::default())),
            prompt,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Restore the persisted token and decide the initial session state.
    ///
    /// The token is validated only when the server requires login.
    ///
    /// # Errors
    /// - Returns error if the token store cannot be read
    pub async fn start(&self, config: &ServerConfig) -> Result<SessionStatus> {
        let token = self.store.load()?;
        if let Some(token) = &token {
            debug!("Restored persisted token");
            self.server.set_token(Some(token.clone())).await;
        }
        let has_token = token.is_some();
        self.lock().token = token;

        if config.login_required && has_token {
            Ok(self.check_token(config).await)
        } else {
            Ok(SessionStatus::Unauthenticated)
        }
    }

    /// Validate the installed token against the server.
    ///
    /// A rejected token opens the login prompt unless guests may browse.
    pub async fn check_token(&self, config: &ServerConfig) -> SessionStatus {
        match self.server.check_token().await {
            Ok(()) => {
                info!("Persisted token accepted");
                self.set_authenticated(true);
                SessionStatus::Authenticated
            }
            Err(e) => {
                warn!("Persisted token rejected: {}", e);
                self.set_authenticated(false);
                if !config.anonymous_allowed {
                    self.events.publish(AppEvent::LoginRequired);
                }
                SessionStatus::Unauthenticated
            }
        }
    }

    /// Exchange credentials for a token.
    ///
    /// On success the token is persisted, installed for every later
    /// request and the prompt closes. On failure nothing changes.
    ///
    /// # Errors
    /// - `Authentication` with the server's message if credentials are rejected
    /// - Returns error if the token cannot be persisted
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<()> {
        let token = self.server.login(username, password).await?;
        self.store.save(&token)?;
        self.server.set_token(Some(token.clone())).await;
        self.lock().token = Some(token);
        self.prompt.close();
        info!("Logged in as {}", username);
        self.set_authenticated(true);
        Ok(())
    }

    /// Erase the persisted token and drop the in-memory session.
    ///
    /// The caller must rebuild the client afterwards; see
    /// [`App::logout`](crate::App::logout).
    ///
    /// # Errors
    /// - Returns error if the persisted token cannot be erased
    pub async fn logout(&self) -> Result<()> {
        self.store.clear()?;
        self.server.set_token(None).await;
        *self.lock() = Session::default();
        info!("Logged out");
        self.events.publish(AppEvent::ReloadRequested);
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().authenticated
    }

    pub fn has_token(&self) -> bool {
        self.lock().token.is_some()
    }

    pub fn prompt(&self) -> &LoginPrompt {
        &self.prompt
    }

    fn set_authenticated(&self, authenticated: bool) {
        let changed = {
            let mut state = self.lock();
            let changed = state.authenticated != authenticated;
            state.authenticated = authenticated;
            changed
        };
        if changed {
            self.events.publish(AppEvent::AuthChanged { authenticated });
        }
    }
}

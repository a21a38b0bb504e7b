//! Bearer tokens and their durable client-side storage.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use filedeck_common::{Error, Result, SecretString};

/// Fixed storage key for the persisted token.
pub const TOKEN_KEY: &str = "auth_token";

/// Token issued by `POST /api/user/login`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken(SecretString);

impl AuthToken {
    /// Wrap a raw token.
    ///
    /// # Errors
    /// - Returns error if the token is empty
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let secret = SecretString::new(raw.into().trim().to_string());
        if secret.is_empty() {
            return Err(Error::InvalidInput("Token cannot be empty".to_string()));
        }
        Ok(Self(secret))
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0.expose())
    }

    /// The raw token.
    pub fn expose(&self) -> &str {
        self.0.expose()
    }
}

/// Durable storage for the session token, surviving restarts.
pub trait TokenStore: Send + Sync {
    /// Load the persisted token, if any.
    fn load(&self) -> Result<Option<AuthToken>>;

    /// Persist `token`, replacing any previous value.
    fn save(&self, token: &AuthToken) -> Result<()>;

    /// Erase the persisted token. Erasing a missing token is not an error.
    fn clear(&self) -> Result<()>;
}

/// Token stored in a single file.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store the token at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `<config dir>/filedeck/auth_token`.
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::NotFound("No configuration directory on this platform".to_string()))?;
        Ok(Self::new(dir.join("filedeck").join(TOKEN_KEY)))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<AuthToken>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => AuthToken::new(raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, token: &AuthToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token.expose())?;
        tracing::debug!("Persisted token to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory token store for testing.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<AuthToken>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `token`.
    pub fn with_token(token: AuthToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<AuthToken>> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn save(&self, token: &AuthToken) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

//! Server capability flags.

use tokio::sync::OnceCell;
use tracing::{error, info};

use filedeck_api::{FileServer, ServerConfig};
use filedeck_common::{Error, Result};

/// Fetches the server configuration once; the value never changes after.
#[derive(Debug, Default)]
pub struct ConfigProvider {
    config: OnceCell<ServerConfig>,
}

impl ConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the configuration, or return the already fetched value.
    ///
    /// # Errors
    /// - `ConfigFetch` if the server could not be asked; fatal for the session
    pub async fn fetch(&self, server: &dyn FileServer) -> Result<ServerConfig> {
        let config = self
            .config
            .get_or_try_init(|| async {
                server.config().await.map_err(|e| {
                    error!("Failed to fetch server config: {}", e);
                    Error::ConfigFetch(e.to_string())
                })
            })
            .await?;
        info!(
            "Server config: login required {}, anonymous allowed {}",
            config.login_required, config.anonymous_allowed
        );
        Ok(*config)
    }

    /// The fetched configuration, if any.
    pub fn get(&self) -> Option<ServerConfig> {
        self.config.get().copied()
    }
}

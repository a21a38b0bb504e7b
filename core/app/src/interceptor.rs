//! Re-authentication interceptor.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use filedeck_api::{
    AuthToken, EntryUpdate, FileServer, ProgressFn, RemoteDirectory, RemoteEntry, ServerConfig,
    UploadSource,
};
use filedeck_common::{EntryId, Result, SecretString};

use crate::events::{AppEvent, EventBus};

/// [`FileServer`] decorator that turns unauthorized responses into
/// [`AppEvent::LoginRequired`], rejected logins included.
///
/// The token check is exempt: a rejected token at startup is handled by
/// the session, not by the prompt.
pub struct ReauthGuard {
    inner: Arc<dyn FileServer>,
    events: EventBus,
}

impl ReauthGuard {
    pub fn new(inner: Arc<dyn FileServer>, events: EventBus) -> Self {
        Self { inner, events }
    }

    fn observe<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_unauthorized() {
                warn!("Server demanded authentication during {}", operation);
                self.events.publish(AppEvent::LoginRequired);
            }
        }
        result
    }
}

#[async_trait]
impl FileServer for ReauthGuard {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn set_token(&self, token: Option<AuthToken>) {
        self.inner.set_token(token).await
    }

    async fn config(&self) -> Result<ServerConfig> {
        let result = self.inner.config().await;
        self.observe("config", result)
    }

    async fn check_token(&self) -> Result<()> {
        self.inner.check_token().await
    }

    async fn login(&self, username: &str, password: &SecretString) -> Result<AuthToken> {
        let result = self.inner.login(username, password).await;
        self.observe("login", result)
    }

    async fn get_directory(&self, id: Option<&EntryId>) -> Result<RemoteDirectory> {
        let result = self.inner.get_directory(id).await;
        self.observe("listing", result)
    }

    async fn create_directory(&self, parent: &EntryId, name: &str) -> Result<RemoteEntry> {
        let result = self.inner.create_directory(parent, name).await;
        self.observe("create", result)
    }

    async fn update_directory(&self, id: &EntryId, update: &EntryUpdate) -> Result<RemoteEntry> {
        let result = self.inner.update_directory(id, update).await;
        self.observe("rename", result)
    }

    async fn delete_directory(&self, id: &EntryId) -> Result<()> {
        let result = self.inner.delete_directory(id).await;
        self.observe("delete", result)
    }

    async fn upload_file(
        &self,
        dir: &EntryId,
        source: UploadSource,
        progress: ProgressFn,
    ) -> Result<RemoteEntry> {
        let result = self.inner.upload_file(dir, source, progress).await;
        self.observe("upload", result)
    }

    async fn update_file(
        &self,
        dir: &EntryId,
        id: &EntryId,
        update: &EntryUpdate,
    ) -> Result<RemoteEntry> {
        let result = self.inner.update_file(dir, id, update).await;
        self.observe("rename", result)
    }

    async fn delete_file(&self, dir: &EntryId, id: &EntryId) -> Result<()> {
        let result = self.inner.delete_file(dir, id).await;
        self.observe("delete", result)
    }
}

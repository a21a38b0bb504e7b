//! File server trait definition.

use async_trait::async_trait;

use filedeck_common::{EntryId, Result, SecretString};

use crate::auth::AuthToken;
use crate::progress::{ProgressFn, UploadSource};
use crate::wire::{EntryUpdate, RemoteDirectory, RemoteEntry, ServerConfig};

/// Client-side view of the file server's REST API.
///
/// Every method is a single request attempt; implementations never retry.
/// Unauthorized responses surface as `Error::Unauthorized`, except on
/// `login`, where rejected credentials are `Error::Authentication`. Both
/// report `is_unauthorized()`.
#[async_trait]
pub trait FileServer: Send + Sync {
    /// Short name of the backend (e.g., "http", "memory").
    fn name(&self) -> &str;

    /// Install or remove the bearer token attached to later requests.
    async fn set_token(&self, token: Option<AuthToken>);

    /// Fetch the server's capability flags.
    async fn config(&self) -> Result<ServerConfig>;

    /// Validate the installed bearer token.
    ///
    /// # Errors
    /// - `Unauthorized` if the token is missing or invalid
    async fn check_token(&self) -> Result<()>;

    /// Exchange credentials for a token.
    ///
    /// Does not install the token; the caller decides.
    ///
    /// # Errors
    /// - `Authentication` with the server's message on bad credentials
    async fn login(&self, username: &str, password: &SecretString) -> Result<AuthToken>;

    /// List a directory; `None` lists the root.
    ///
    /// # Errors
    /// - `NotFound` if the directory does not exist
    async fn get_directory(&self, id: Option<&EntryId>) -> Result<RemoteDirectory>;

    /// Create a directory under `parent`.
    ///
    /// # Errors
    /// - `Validation` if the name is rejected or already taken
    async fn create_directory(&self, parent: &EntryId, name: &str) -> Result<RemoteEntry>;

    /// Rename or move a directory.
    async fn update_directory(&self, id: &EntryId, update: &EntryUpdate) -> Result<RemoteEntry>;

    /// Delete a directory. The server accepts file ids here as well.
    async fn delete_directory(&self, id: &EntryId) -> Result<()>;

    /// Upload a file into `dir` as multipart field `file`.
    ///
    /// `progress` is called with a non-decreasing percentage while the
    /// body is being sent.
    async fn upload_file(
        &self,
        dir: &EntryId,
        source: UploadSource,
        progress: ProgressFn,
    ) -> Result<RemoteEntry>;

    /// Rename or move a file that lives in `dir`.
    async fn update_file(
        &self,
        dir: &EntryId,
        id: &EntryId,
        update: &EntryUpdate,
    ) -> Result<RemoteEntry>;

    /// Delete a file that lives in `dir`.
    async fn delete_file(&self, dir: &EntryId, id: &EntryId) -> Result<()>;
}

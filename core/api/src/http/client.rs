//! File server API client over HTTP.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Body, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use url::Url;

use filedeck_common::{EntryId, Error, Result, SecretString};

use super::{encode_segment, ClientConfig};
use crate::auth::AuthToken;
use crate::progress::{track_progress, ProgressFn, UploadSource};
use crate::server::FileServer;
use crate::wire::{
    Envelope, EntryUpdate, LoginRequest, NewDirectory, RemoteDirectory, RemoteEntry, ServerConfig,
};

/// `reqwest` implementation of [`FileServer`].
pub struct HttpServer {
    http: Client,
    base: String,
    token: RwLock<Option<AuthToken>>,
}

impl HttpServer {
    /// Create a new client for the server described by `config`.
    ///
    /// # Errors
    /// - `InvalidInput` if the base URL is not an absolute http(s) URL
    /// - `Network` if the HTTP client cannot be built
    pub fn new(config: ClientConfig) -> Result<Self> {
        let url = Url::parse(&config.base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid server URL {}: {}", config.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base: url.as_str().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn directory_path(id: &EntryId) -> String {
        format!("/api/directories/{}", encode_segment(id.as_str()))
    }

    fn file_path(dir: &EntryId, id: &EntryId) -> String {
        format!(
            "/api/directories/{}/files/{}",
            encode_segment(dir.as_str()),
            encode_segment(id.as_str())
        )
    }

    /// Attach the bearer token, if one is installed.
    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().await.as_ref() {
            Some(token) => request.header(header::AUTHORIZATION, token.bearer()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        tracing::debug!("Request: {}", what);
        self.authorize(request)
            .await
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to {}: {}", what, e)))
    }

    /// Handle API response with error checking, returning the envelope data.
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let envelope: Envelope<T> = response
                .json()
                .await
                .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)))?;
            envelope
                .data
                .ok_or_else(|| Error::Serialization("Response carried no data".to_string()))
        } else {
            Err(Self::error_from(response).await)
        }
    }

    /// Handle API response whose body is irrelevant on success.
    async fn handle_empty(response: reqwest::Response) -> Result<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn error_from(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
            .ok()
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
        error_for_status(status, message)
    }
}

/// Map a non-success status and the server's message to an error.
pub(crate) fn error_for_status(status: StatusCode, message: String) -> Error {
    match status {
        StatusCode::BAD_REQUEST => Error::Validation(message),
        StatusCode::UNAUTHORIZED => Error::Unauthorized(message),
        StatusCode::FORBIDDEN => Error::PermissionDenied(message),
        StatusCode::NOT_FOUND => Error::NotFound(message),
        _ => Error::Network(format!("API error: {} - {}", status, message)),
    }
}

#[async_trait]
impl FileServer for HttpServer {
    fn name(&self) -> &str {
        "http"
    }

    async fn set_token(&self, token: Option<AuthToken>) {
        *self.token.write().await = token;
    }

    async fn config(&self) -> Result<ServerConfig> {
        let request = self.http.get(self.endpoint("/api/config"));
        let response = self.send(request, "fetch config").await?;
        Self::handle_response(response).await
    }

    async fn check_token(&self) -> Result<()> {
        let request = self.http.get(self.endpoint("/api/check_token"));
        let response = self.send(request, "check token").await?;
        Self::handle_empty(response).await
    }

    async fn login(&self, username: &str, password: &SecretString) -> Result<AuthToken> {
        let body = LoginRequest {
            username,
            password: password.expose(),
        };
        let response = self
            .http
            .post(self.endpoint("/api/user/login"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to log in: {}", e)))?;

        let raw: String = match Self::handle_response(response).await {
            Ok(raw) => raw,
            Err(Error::Unauthorized(message)) => return Err(Error::Authentication(message)),
            Err(e) => return Err(e),
        };
        AuthToken::new(raw)
    }

    async fn get_directory(&self, id: Option<&EntryId>) -> Result<RemoteDirectory> {
        let path = match id {
            Some(id) => Self::directory_path(id),
            None => "/api/directories".to_string(),
        };
        let request = self.http.get(self.endpoint(&path));
        let response = self.send(request, "list directory").await?;
        Self::handle_response(response).await
    }

    async fn create_directory(&self, parent: &EntryId, name: &str) -> Result<RemoteEntry> {
        let body = NewDirectory {
            parent: parent.clone(),
            name: name.to_string(),
        };
        let request = self.http.post(self.endpoint("/api/directories/")).json(&body);
        let response = self.send(request, "create directory").await?;
        Self::handle_response(response).await
    }

    async fn update_directory(&self, id: &EntryId, update: &EntryUpdate) -> Result<RemoteEntry> {
        let request = self.http.put(self.endpoint(&Self::directory_path(id))).json(update);
        let response = self.send(request, "update directory").await?;
        Self::handle_response(response).await
    }

    async fn delete_directory(&self, id: &EntryId) -> Result<()> {
        let request = self.http.delete(self.endpoint(&Self::directory_path(id)));
        let response = self.send(request, "delete directory").await?;
        Self::handle_empty(response).await
    }

    async fn upload_file(
        &self,
        dir: &EntryId,
        source: UploadSource,
        progress: ProgressFn,
    ) -> Result<RemoteEntry> {
        let name = source.name().to_string();
        let total = source.len();
        let stream = track_progress(source.into_stream().await?, total, progress);

        let part = Part::stream_with_length(Body::wrap_stream(stream), total).file_name(name);
        let form = Form::new().part("file", part);

        let url = self.endpoint(&format!("{}/files", Self::directory_path(dir)));
        let request = self.http.post(url).multipart(form);
        let response = self.send(request, "upload file").await?;
        Self::handle_response(response).await
    }

    async fn update_file(
        &self,
        dir: &EntryId,
        id: &EntryId,
        update: &EntryUpdate,
    ) -> Result<RemoteEntry> {
        let request = self.http.put(self.endpoint(&Self::file_path(dir, id))).json(update);
        let response = self.send(request, "update file").await?;
        Self::handle_response(response).await
    }

    async fn delete_file(&self, dir: &EntryId, id: &EntryId) -> Result<()> {
        let request = self.http.delete(self.endpoint(&Self::file_path(dir, id)));
        let response = self.send(request, "delete file").await?;
        Self::handle_empty(response).await
    }
}

//! In-memory file server for testing.

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::RwLock as AsyncRwLock;
use uuid::Uuid;

use filedeck_common::{EntryId, Error, Result, SecretString};

use crate::auth::AuthToken;
use crate::progress::{track_progress, ProgressFn, UploadSource};
use crate::server::FileServer;
use crate::wire::{EntryUpdate, RemoteDirectory, RemoteEntry, ServerConfig};

/// Stored node.
#[derive(Debug, Clone)]
struct Node {
    entry: RemoteEntry,
    data: Vec<u8>,
}

/// Requests the fake server should fail on.
#[derive(Debug, Default)]
struct Faults {
    config_unavailable: bool,
    listings_unavailable: bool,
    uploads: HashSet<String>,
    deletes: HashSet<EntryId>,
}

#[derive(Debug, Default)]
struct Counters {
    listings: usize,
    uploads: usize,
}

/// In-memory file server.
///
/// Emulates the real server's auth middleware: when credentials are
/// configured every request needs a valid token, except reads while guest
/// mode is on. Useful for testing; all data is lost on drop.
pub struct MemoryServer {
    root: EntryId,
    credentials: Option<(String, String)>,
    guest_mode: bool,
    nodes: Arc<RwLock<HashMap<EntryId, Node>>>,
    issued: RwLock<HashSet<String>>,
    token: AsyncRwLock<Option<AuthToken>>,
    faults: RwLock<Faults>,
    counters: RwLock<Counters>,
}

impl MemoryServer {
    /// Server without login.
    pub fn open() -> Self {
        Self::build(None, false)
    }

    /// Server requiring `username`/`password`, optionally allowing guests
    /// read-only access.
    pub fn with_login(username: &str, password: &str, guest_mode: bool) -> Self {
        Self::build(Some((username.to_string(), password.to_string())), guest_mode)
    }

    fn build(credentials: Option<(String, String)>, guest_mode: bool) -> Self {
        let root = Node {
            entry: RemoteEntry {
                id: EntryId::random(),
                name: "/".to_string(),
                dir: true,
                size: 0,
                parent: None,
                mtime: Some(Utc::now()),
            },
            data: Vec::new(),
        };
        let root_id = root.entry.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);

        Self {
            root: root_id,
            credentials,
            guest_mode,
            nodes: Arc::new(RwLock::new(nodes)),
            issued: RwLock::new(HashSet::new()),
            token: AsyncRwLock::new(None),
            faults: RwLock::new(Faults::default()),
            counters: RwLock::new(Counters::default()),
        }
    }

    /// Identifier of the root directory.
    pub fn root_id(&self) -> EntryId {
        self.root.clone()
    }

    /// Make `GET /api/config` fail.
    pub fn fail_config(&self) {
        write(&self.faults).config_unavailable = true;
    }

    /// Make every directory listing fail.
    pub fn fail_listings(&self) {
        write(&self.faults).listings_unavailable = true;
    }

    /// Make uploads of `file_name` fail half way through the body.
    pub fn fail_upload(&self, file_name: &str) {
        write(&self.faults).uploads.insert(file_name.to_string());
    }

    /// Make deleting `id` fail.
    pub fn fail_delete(&self, id: &EntryId) {
        write(&self.faults).deletes.insert(id.clone());
    }

    /// Invalidate every token issued so far.
    pub fn revoke_tokens(&self) {
        write(&self.issued).clear();
    }

    /// Seed a directory without going through auth.
    pub fn seed_dir(&self, parent: &EntryId, name: &str) -> EntryId {
        self.insert(parent, name, true, Vec::new())
    }

    /// Seed a file without going through auth.
    pub fn seed_file(&self, parent: &EntryId, name: &str, data: &[u8]) -> EntryId {
        self.insert(parent, name, false, data.to_vec())
    }

    /// Stored content of a file.
    pub fn content(&self, id: &EntryId) -> Option<Vec<u8>> {
        read(&self.nodes).get(id).map(|n| n.data.clone())
    }

    /// Look up an entry by name inside `parent`.
    pub fn find(&self, parent: &EntryId, name: &str) -> Option<RemoteEntry> {
        read(&self.nodes)
            .values()
            .find(|n| n.entry.parent.as_ref() == Some(parent) && n.entry.name == name)
            .map(|n| n.entry.clone())
    }

    /// Number of directory listings served.
    pub fn listing_count(&self) -> usize {
        read(&self.counters).listings
    }

    /// Number of uploads attempted.
    pub fn upload_count(&self) -> usize {
        read(&self.counters).uploads
    }

    fn insert(&self, parent: &EntryId, name: &str, dir: bool, data: Vec<u8>) -> EntryId {
        let id = EntryId::random();
        let entry = RemoteEntry {
            id: id.clone(),
            name: name.to_string(),
            dir,
            size: data.len() as u64,
            parent: Some(parent.clone()),
            mtime: Some(Utc::now()),
        };
        write(&self.nodes).insert(id.clone(), Node { entry, data });
        id
    }

    /// Emulation of the server's auth middleware.
    async fn authorize(&self, read_only: bool) -> Result<()> {
        if self.credentials.is_none() || (self.guest_mode && read_only) {
            return Ok(());
        }
        let token = self.token.read().await;
        match token.as_ref() {
            Some(t) if read(&self.issued).contains(t.expose()) => Ok(()),
            _ => Err(Error::Unauthorized("authorization failed".to_string())),
        }
    }

    fn validate_name(
        nodes: &HashMap<EntryId, Node>,
        parent: &EntryId,
        name: &str,
        except: Option<&EntryId>,
    ) -> Result<()> {
        if name.trim().is_empty() || name.contains('/') {
            return Err(Error::Validation(format!("invalid name: {:?}", name)));
        }
        match nodes.get(parent) {
            Some(p) if p.entry.dir => {}
            _ => {
                return Err(Error::Validation(
                    "parent does not exist or not a directory".to_string(),
                ))
            }
        }
        let taken = nodes.values().any(|n| {
            n.entry.parent.as_ref() == Some(parent)
                && n.entry.name == name
                && Some(&n.entry.id) != except
        });
        if taken {
            return Err(Error::Validation("file already exists".to_string()));
        }
        Ok(())
    }

    fn rename(&self, id: &EntryId, update: &EntryUpdate, expect_dir: bool) -> Result<RemoteEntry> {
        let mut nodes = write(&self.nodes);
        let current = nodes
            .get(id)
            .filter(|n| n.entry.dir == expect_dir)
            .map(|n| n.entry.clone())
            .ok_or_else(|| Error::NotFound("file does not exist".to_string()))?;
        if current.parent.is_none() {
            return Err(Error::PermissionDenied("permission denied".to_string()));
        }
        let parent = update.parent.clone().or(current.parent.clone());
        if let Some(parent) = &parent {
            Self::validate_name(&nodes, parent, &update.name, Some(id))?;
        }
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound("file does not exist".to_string()))?;
        node.entry.name = update.name.clone();
        node.entry.parent = parent;
        node.entry.mtime = Some(Utc::now());
        Ok(node.entry.clone())
    }

    fn remove_tree(&self, id: &EntryId) -> Result<()> {
        if read(&self.faults).deletes.contains(id) {
            return Err(Error::Network("API error: 500 - internal server error".to_string()));
        }
        let mut nodes = write(&self.nodes);
        match nodes.get(id) {
            None => return Err(Error::NotFound("file does not exist".to_string())),
            Some(n) if n.entry.parent.is_none() => {
                return Err(Error::PermissionDenied("permission denied".to_string()))
            }
            Some(_) => {}
        }
        let mut pending = vec![id.clone()];
        while let Some(next) = pending.pop() {
            nodes.remove(&next);
            pending.extend(
                nodes
                    .values()
                    .filter(|n| n.entry.parent.as_ref() == Some(&next))
                    .map(|n| n.entry.id.clone()),
            );
        }
        Ok(())
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl FileServer for MemoryServer {
    fn name(&self) -> &str {
        "memory"
    }

    async fn set_token(&self, token: Option<AuthToken>) {
        *self.token.write().await = token;
    }

    async fn config(&self) -> Result<ServerConfig> {
        if read(&self.faults).config_unavailable {
            return Err(Error::Network("API error: 503 - service unavailable".to_string()));
        }
        Ok(ServerConfig {
            login_required: self.credentials.is_some(),
            anonymous_allowed: self.guest_mode,
        })
    }

    async fn check_token(&self) -> Result<()> {
        self.authorize(true).await
    }

    async fn login(&self, username: &str, password: &SecretString) -> Result<AuthToken> {
        let Some((expected_user, expected_password)) = &self.credentials else {
            // Login disabled: the real server signs with an empty secret.
            return AuthToken::new(Uuid::new_v4().to_string());
        };
        if username != expected_user || password.expose() != expected_password {
            return Err(Error::Authentication("invalid username or password".to_string()));
        }
        let raw = Uuid::new_v4().to_string();
        write(&self.issued).insert(raw.clone());
        AuthToken::new(raw)
    }

    async fn get_directory(&self, id: Option<&EntryId>) -> Result<RemoteDirectory> {
        self.authorize(true).await?;
        if read(&self.faults).listings_unavailable {
            return Err(Error::Network("connection refused".to_string()));
        }
        write(&self.counters).listings += 1;

        let id = id.cloned().unwrap_or_else(|| self.root_id());
        let nodes = read(&self.nodes);
        let dir = nodes
            .get(&id)
            .filter(|n| n.entry.dir)
            .ok_or_else(|| Error::NotFound("file does not exist".to_string()))?;

        let mut children: Vec<RemoteEntry> = nodes
            .values()
            .filter(|n| n.entry.parent.as_ref() == Some(&id))
            .map(|n| n.entry.clone())
            .collect();
        children.sort_by(|a, b| b.dir.cmp(&a.dir).then_with(|| a.name.cmp(&b.name)));

        Ok(RemoteDirectory {
            entry: dir.entry.clone(),
            // the real server sends null for empty directories
            files: if children.is_empty() { None } else { Some(children) },
        })
    }

    async fn create_directory(&self, parent: &EntryId, name: &str) -> Result<RemoteEntry> {
        self.authorize(false).await?;
        Self::validate_name(&read(&self.nodes), parent, name, None)?;
        let id = self.insert(parent, name, true, Vec::new());
        read(&self.nodes)
            .get(&id)
            .map(|n| n.entry.clone())
            .ok_or_else(|| Error::NotFound("file does not exist".to_string()))
    }

    async fn update_directory(&self, id: &EntryId, update: &EntryUpdate) -> Result<RemoteEntry> {
        self.authorize(false).await?;
        self.rename(id, update, true)
    }

    async fn delete_directory(&self, id: &EntryId) -> Result<()> {
        self.authorize(false).await?;
        self.remove_tree(id)
    }

    async fn upload_file(
        &self,
        dir: &EntryId,
        source: UploadSource,
        progress: ProgressFn,
    ) -> Result<RemoteEntry> {
        self.authorize(false).await?;
        write(&self.counters).uploads += 1;

        let name = source.name().to_string();
        Self::validate_name(&read(&self.nodes), dir, &name, None)?;

        let total = source.len();
        let fail_midway = read(&self.faults).uploads.contains(&name);
        let mut stream = track_progress(source.into_stream().await?, total, progress);

        let mut data = Vec::with_capacity(total as usize);
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
            tokio::task::yield_now().await;
            if fail_midway && data.len() as u64 * 2 >= total {
                return Err(Error::Network("connection reset by peer".to_string()));
            }
        }
        if fail_midway {
            return Err(Error::Network("connection reset by peer".to_string()));
        }

        let id = self.insert(dir, &name, false, data);
        read(&self.nodes)
            .get(&id)
            .map(|n| n.entry.clone())
            .ok_or_else(|| Error::NotFound("file does not exist".to_string()))
    }

    async fn update_file(
        &self,
        dir: &EntryId,
        id: &EntryId,
        update: &EntryUpdate,
    ) -> Result<RemoteEntry> {
        self.authorize(false).await?;
        let in_dir = read(&self.nodes)
            .get(id)
            .map(|n| n.entry.parent.as_ref() == Some(dir))
            .unwrap_or(false);
        if !in_dir {
            return Err(Error::NotFound("file does not exist".to_string()));
        }
        self.rename(id, update, false)
    }

    async fn delete_file(&self, dir: &EntryId, id: &EntryId) -> Result<()> {
        self.authorize(false).await?;
        let in_dir = read(&self.nodes)
            .get(id)
            .map(|n| !n.entry.dir && n.entry.parent.as_ref() == Some(dir))
            .unwrap_or(false);
        if !in_dir {
            return Err(Error::NotFound("file does not exist".to_string()));
        }
        self.remove_tree(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn no_progress() -> ProgressFn {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn test_open_server_lists_root() {
        let server = MemoryServer::open();
        let root = server.root_id();
        server.seed_file(&root, "b.txt", b"bb");
        server.seed_dir(&root, "a-dir");

        let listing = server.get_directory(None).await.unwrap();
        assert_eq!(listing.entry.id, root);
        let names: Vec<_> = listing.files.unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a-dir", "b.txt"]);
    }

    #[tokio::test]
    async fn test_empty_directory_has_null_files() {
        let server = MemoryServer::open();
        let listing = server.get_directory(None).await.unwrap();
        assert!(listing.files.is_none());
    }

    #[tokio::test]
    async fn test_login_required_blocks_everything_without_token() {
        let server = MemoryServer::with_login("admin", "secret", false);
        let err = server.get_directory(None).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(server.check_token().await.unwrap_err().is_unauthorized());
    }

    #[tokio::test]
    async fn test_guest_mode_allows_reads_only() {
        let server = MemoryServer::with_login("admin", "secret", true);
        let root = server.root_id();
        assert!(server.get_directory(None).await.is_ok());
        let err = server.create_directory(&root, "docs").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_login_and_token() {
        let server = MemoryServer::with_login("admin", "secret", false);
        let bad = server.login("admin", &SecretString::new("nope")).await;
        assert!(matches!(bad, Err(Error::Authentication(_))));

        let token = server.login("admin", &SecretString::new("secret")).await.unwrap();
        server.set_token(Some(token)).await;
        assert!(server.check_token().await.is_ok());

        server.revoke_tokens();
        assert!(server.check_token().await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_directory_is_validation_error() {
        let server = MemoryServer::open();
        let root = server.root_id();
        server.create_directory(&root, "docs").await.unwrap();
        let err = server.create_directory(&root, "docs").await.unwrap_err();
        assert!(matches!(err, Error::Validation(m) if m == "file already exists"));
    }

    #[tokio::test]
    async fn test_upload_reports_progress_and_stores_content() {
        let server = MemoryServer::open();
        let root = server.root_id();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |p| sink.lock().unwrap().push(p));

        let entry = server
            .upload_file(&root, UploadSource::from_bytes("hello.txt", "hello"), progress)
            .await
            .unwrap();
        assert_eq!(entry.size, 5);
        assert_eq!(server.content(&entry.id).unwrap(), b"hello");
        assert_eq!(*seen.lock().unwrap().last().unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_injected_upload_failure() {
        let server = MemoryServer::open();
        let root = server.root_id();
        server.fail_upload("report.pdf");
        let result = server
            .upload_file(&root, UploadSource::from_bytes("report.pdf", vec![0u8; 1024]), no_progress())
            .await;
        assert!(result.is_err());
        assert!(server.find(&root, "report.pdf").is_none());
    }

    #[tokio::test]
    async fn test_delete_directory_removes_subtree() {
        let server = MemoryServer::open();
        let root = server.root_id();
        let docs = server.seed_dir(&root, "docs");
        let nested = server.seed_file(&docs, "a.txt", b"a");

        server.delete_directory(&docs).await.unwrap();
        assert!(server.content(&nested).is_none());
        assert!(server.delete_directory(&root).await.is_err());
    }

    #[tokio::test]
    async fn test_rename_file_within_directory() {
        let server = MemoryServer::open();
        let root = server.root_id();
        let file = server.seed_file(&root, "old.txt", b"x");
        let update = EntryUpdate {
            name: "new.txt".to_string(),
            parent: Some(root.clone()),
        };
        let renamed = server.update_file(&root, &file, &update).await.unwrap();
        assert_eq!(renamed.name, "new.txt");

        let other = server.seed_dir(&root, "elsewhere");
        assert!(server.update_file(&other, &file, &update).await.is_err());
    }
}

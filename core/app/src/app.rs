//! Application facade tying the components together.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use filedeck_api::{FileServer, ServerConfig, TokenStore, UploadSource};
use filedeck_common::{EntryId, Error, Result, SecretString};

use crate::config_provider::ConfigProvider;
use crate::context::AppContext;
use crate::directory::{BatchDeleteReport, Directory, DirectoryStore, FileEntry};
use crate::events::AppEvent;
use crate::gate::{self, Action, Actions};
use crate::links;
use crate::selection::Selection;
use crate::session::SessionManager;
use crate::upload::{UploadBatch, UploadCoordinator, UploadTask};

/// Lifecycle status of an [`App`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppStatus {
    Ready,
    /// The server configuration could not be fetched; nothing works.
    Crashed(String),
}

/// One running client session.
///
/// Built by [`App::start`], torn down on drop or by [`App::logout`],
/// which returns a freshly started replacement.
pub struct App {
    ctx: AppContext,
    /// Unwrapped handle, kept for rebuilding.
    server: Arc<dyn FileServer>,
    token_store: Arc<dyn TokenStore>,
    status: AppStatus,
    config: ConfigProvider,
    session: SessionManager,
    directory: DirectoryStore,
    uploads: UploadCoordinator,
    actions: Arc<watch::Sender<Actions>>,
}

impl App {
    /// Start a session against `server`.
    ///
    /// Fetches the configuration, restores the persisted token, checks it
    /// when the server requires login and loads the root directory. A
    /// failed configuration fetch leaves the app in
    /// [`AppStatus::Crashed`] instead of failing here.
    ///
    /// # Errors
    /// - Returns error if the token store cannot be read
    pub async fn start(
        base_url: impl Into<String>,
        server: Arc<dyn FileServer>,
        token_store: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let ctx = AppContext::new(base_url, server.clone());
        let session = SessionManager::new(&ctx, token_store.clone());
        let directory = DirectoryStore::new(&ctx);
        let uploads = UploadCoordinator::new(&ctx, directory.clone());
        let (actions, _) = watch::channel(Actions::default());

        let mut app = Self {
            ctx,
            server,
            token_store,
            status: AppStatus::Ready,
            config: ConfigProvider::new(),
            session,
            directory,
            uploads,
            actions: Arc::new(actions),
        };

        let config = match app.config.fetch(app.ctx.server().as_ref()).await {
            Ok(config) => config,
            Err(e) => {
                app.status = AppStatus::Crashed(e.user_message());
                return Ok(app);
            }
        };

        app.recompute_on_change(config);
        app.session.start(&config).await?;
        if let Err(e) = app.directory.load(None).await {
            warn!("Failed to load root directory: {}", e);
        }
        app.publish_actions();
        info!("Connected to {}", app.ctx.base_url());
        Ok(app)
    }

    /// Recompute the gate whenever auth state or selection may have changed.
    fn recompute_on_change(&self, config: ServerConfig) {
        let session = self.session.clone();
        let directory = self.directory.clone();
        let actions = self.actions.clone();
        self.ctx.events().on(move |event| {
            if matches!(
                event,
                AppEvent::AuthChanged { .. }
                    | AppEvent::DirectoryLoaded { .. }
                    | AppEvent::SelectionChanged { .. }
            ) {
                actions.send_replace(gate::evaluate(
                    &config,
                    session.is_authenticated(),
                    &directory.selection(),
                ));
            }
        });
    }

    fn publish_actions(&self) {
        self.actions.send_replace(self.actions());
    }

    fn ensure_ready(&self) -> Result<ServerConfig> {
        match (&self.status, self.config.get()) {
            (AppStatus::Ready, Some(config)) => Ok(config),
            (AppStatus::Crashed(message), _) => Err(Error::ConfigFetch(message.clone())),
            (AppStatus::Ready, None) => Err(Error::ConfigFetch("configuration missing".to_string())),
        }
    }

    fn require(&self, action: Action) -> Result<()> {
        self.ensure_ready()?;
        self.actions().require(action)
    }

    pub fn status(&self) -> &AppStatus {
        &self.status
    }

    pub fn base_url(&self) -> &str {
        self.ctx.base_url()
    }

    pub fn config(&self) -> Option<ServerConfig> {
        self.config.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn login_prompt_open(&self) -> bool {
        self.session.prompt().is_open()
    }

    pub fn current(&self) -> Directory {
        self.directory.current()
    }

    pub fn selection(&self) -> Selection {
        self.directory.selection()
    }

    /// Currently enabled actions, derived fresh from current state.
    pub fn actions(&self) -> Actions {
        match self.ensure_ready() {
            Ok(config) => gate::evaluate(
                &config,
                self.session.is_authenticated(),
                &self.directory.selection(),
            ),
            Err(_) => Actions::default(),
        }
    }

    /// Receiver that sees every recomputation of the gate.
    pub fn watch_actions(&self) -> watch::Receiver<Actions> {
        self.actions.subscribe()
    }

    /// # Errors
    /// - `NotPermitted` after teardown
    pub fn subscribe(&self) -> Result<broadcast::Receiver<AppEvent>> {
        self.ctx.events().subscribe()
    }

    pub fn upload_tasks(&self) -> Vec<UploadTask> {
        self.uploads.tasks()
    }

    /// Dismiss failed uploads.
    pub fn clear_failed_uploads(&self) -> usize {
        self.uploads.clear_failed()
    }

    /// Log in and show the root directory.
    ///
    /// # Errors
    /// - `Authentication` with the server's message; the login prompt opens
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<()> {
        self.ensure_ready()?;
        self.session.login(username, password).await?;
        if let Err(e) = self.directory.load(None).await {
            warn!("Failed to load root directory after login: {}", e);
        }
        Ok(())
    }

    /// Forget the session and start over with nothing authorized in memory.
    ///
    /// # Errors
    /// - Returns error if the persisted token cannot be erased
    pub async fn logout(self) -> Result<App> {
        self.session.logout().await?;
        self.ctx.events().close();
        App::start(
            self.ctx.base_url().to_string(),
            self.server.clone(),
            self.token_store.clone(),
        )
        .await
    }

    /// Show directory `id`, or the root.
    ///
    /// # Errors
    /// - `Unauthorized` if the server demands login; the view is kept
    pub async fn open_directory(&self, id: Option<&EntryId>) -> Result<Directory> {
        self.ensure_ready()?;
        self.directory.load(id).await
    }

    /// Reload the current directory.
    pub async fn refresh(&self) -> Result<Directory> {
        self.ensure_ready()?;
        self.directory.reload().await
    }

    pub fn select_all(&self, selected: bool) -> Result<()> {
        self.ensure_ready()?;
        self.directory.select_all(selected);
        Ok(())
    }

    /// # Errors
    /// - `InvalidInput` if `id` is not in the current directory
    pub fn toggle(&self, id: &EntryId) -> Result<bool> {
        self.ensure_ready()?;
        self.directory.toggle(id)
    }

    /// # Errors
    /// - `InvalidInput` if `id` is not in the current directory
    pub fn set_selected(&self, id: &EntryId, selected: bool) -> Result<()> {
        self.ensure_ready()?;
        self.directory.set_selected(id, selected)
    }

    /// Create a folder in the current directory.
    ///
    /// # Errors
    /// - `NotPermitted` if creating is disabled
    /// - `Validation` with the server's message
    pub async fn create_directory(&self, name: &str) -> Result<FileEntry> {
        self.require(Action::Create)?;
        let parent = self.directory.current().require_id()?.clone();
        let created = self.directory.create(&parent, name).await?;
        self.directory.reload().await?;
        Ok(created)
    }

    /// Rename the single selected entry.
    ///
    /// # Errors
    /// - `NotPermitted` unless exactly one entry is selected and writes are allowed
    /// - `Validation` with the server's message
    pub async fn rename_selected(&self, new_name: &str) -> Result<FileEntry> {
        self.require(Action::Rename)?;
        let selection = self.directory.selection();
        let entry = selection
            .single()
            .ok_or_else(|| Error::NotPermitted("Select exactly one entry to rename".to_string()))?;
        let renamed = self
            .directory
            .rename(&entry.id, entry.is_directory, new_name, entry.parent_id.as_ref())
            .await?;
        self.directory.reload().await?;
        Ok(renamed)
    }

    /// Delete every selected entry.
    ///
    /// # Errors
    /// - `NotPermitted` if nothing is selected or writes are not allowed
    pub async fn delete_selected(&self) -> Result<BatchDeleteReport> {
        self.require(Action::Delete)?;
        Ok(self.directory.delete_selected().await)
    }

    /// Upload `sources` into the current directory.
    ///
    /// # Errors
    /// - `NotPermitted` if uploading is disabled
    pub fn upload(&self, sources: Vec<UploadSource>) -> Result<UploadBatch> {
        self.require(Action::Upload)?;
        let target = self.directory.current().require_id()?.clone();
        Ok(self.uploads.upload(&target, sources))
    }

    /// Share link for the single selected file.
    ///
    /// # Errors
    /// - `NotPermitted` unless exactly one file is selected
    pub fn share_link(&self) -> Result<String> {
        self.require(Action::CopyLink)?;
        let selection = self.directory.selection();
        let file = selection
            .single_file()
            .ok_or_else(|| Error::NotPermitted("Select exactly one file".to_string()))?;
        Ok(links::share_link(self.ctx.base_url(), &file.id))
    }

    /// Download URL of file `id` in the current directory.
    ///
    /// # Errors
    /// - `NotFound` if `id` is not in the current directory
    /// - `InvalidInput` if `id` is a directory
    pub fn open_url(&self, id: &EntryId) -> Result<String> {
        self.ensure_ready()?;
        let current = self.directory.current();
        let entry = current
            .entry(id)
            .ok_or_else(|| Error::NotFound(format!("{} is not in the current directory", id)))?;
        if entry.is_directory {
            return Err(Error::InvalidInput(format!("{} is a directory", entry.name)));
        }
        Ok(links::open_url(self.ctx.base_url(), &entry.id, &entry.name))
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.ctx.events().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filedeck_api::{MemoryServer, MemoryTokenStore};
    use std::time::Duration;

    const BASE: &str = "http://localhost:2525";

    async fn start(server: Arc<MemoryServer>) -> App {
        App::start(BASE, server, Arc::new(MemoryTokenStore::new()))
            .await
            .unwrap()
    }

    fn entry_named(app: &App, name: &str) -> EntryId {
        app.current()
            .entries
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| e.id)
            .unwrap()
    }

    #[tokio::test]
    async fn test_config_failure_crashes_app() {
        let server = Arc::new(MemoryServer::open());
        server.fail_config();
        let app = start(server).await;

        assert!(matches!(app.status(), AppStatus::Crashed(_)));
        assert_eq!(app.actions(), Actions::default());
        assert!(matches!(app.refresh().await, Err(Error::ConfigFetch(_))));
        assert!(matches!(app.select_all(true), Err(Error::ConfigFetch(_))));
        assert!(matches!(
            app.create_directory("x").await,
            Err(Error::ConfigFetch(_))
        ));
    }

    #[tokio::test]
    async fn test_open_server_loads_root() {
        let server = Arc::new(MemoryServer::open());
        let root = server.root_id();
        server.seed_file(&root, "a.txt", b"a");
        let app = start(server).await;

        assert_eq!(app.status(), &AppStatus::Ready);
        assert_eq!(app.current().id, Some(root));
        assert_eq!(app.current().entries.len(), 1);
        assert!(!app.login_prompt_open());

        let actions = app.actions();
        assert!(actions.can_create);
        assert!(actions.can_upload);
        assert_eq!(*app.watch_actions().borrow(), actions);
    }

    #[tokio::test]
    async fn test_locked_server_prompts_before_anything_is_enabled() {
        let server = Arc::new(MemoryServer::with_login("admin", "secret", false));
        let app = start(server).await;

        assert!(!app.is_authenticated());
        assert!(app.login_prompt_open());
        assert!(app.current().is_placeholder());
        assert_eq!(app.actions(), Actions::default());
        assert!(matches!(
            app.create_directory("x").await,
            Err(Error::NotPermitted(_))
        ));
    }

    #[tokio::test]
    async fn test_login_enables_actions_and_loads_root() {
        let server = Arc::new(MemoryServer::with_login("admin", "secret", false));
        let root = server.root_id();
        server.seed_dir(&root, "docs");
        let app = start(server).await;
        let mut actions = app.watch_actions();

        let err = app
            .login("admin", &SecretString::new("bad"))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "invalid username or password");
        assert!(app.login_prompt_open());

        app.login("admin", &SecretString::new("secret"))
            .await
            .unwrap();
        assert!(app.is_authenticated());
        assert!(!app.login_prompt_open());
        assert_eq!(app.current().id, Some(root));
        assert!(actions.has_changed().unwrap());
        assert!(actions.borrow_and_update().can_create);
    }

    #[tokio::test]
    async fn test_rejected_login_opens_prompt_for_guests() {
        let server = Arc::new(MemoryServer::with_login("admin", "secret", true));
        let app = start(server).await;
        assert!(!app.login_prompt_open());

        let err = app
            .login("admin", &SecretString::new("wrong"))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert!(app.login_prompt_open());
        assert!(!app.is_authenticated());
    }

    #[tokio::test]
    async fn test_guest_mode_is_read_only() {
        let server = Arc::new(MemoryServer::with_login("admin", "secret", true));
        let root = server.root_id();
        server.seed_file(&root, "public.txt", b"hello");
        server.seed_dir(&root, "dir");
        let app = start(server).await;

        assert!(!app.login_prompt_open());
        assert_eq!(app.current().entries.len(), 2);

        let file = entry_named(&app, "public.txt");
        app.toggle(&file).unwrap();
        let actions = app.actions();
        assert!(actions.can_copy_link);
        assert!(!actions.can_rename);
        assert!(!actions.can_delete);
        assert_eq!(app.share_link().unwrap(), format!("{}/files/{}", BASE, file));
        assert!(matches!(app.delete_selected().await, Err(Error::NotPermitted(_))));

        app.select_all(true).unwrap();
        let actions = app.actions();
        assert!(!actions.can_copy_link);
        assert!(!actions.can_create);
    }

    #[tokio::test]
    async fn test_mixed_selection_gates_actions() {
        let server = Arc::new(MemoryServer::open());
        let root = server.root_id();
        server.seed_dir(&root, "photos");
        server.seed_file(&root, "notes.txt", b"n");
        let app = start(server).await;
        let watcher = app.watch_actions();

        app.set_selected(&entry_named(&app, "photos"), true).unwrap();
        app.set_selected(&entry_named(&app, "notes.txt"), true).unwrap();

        let actions = *watcher.borrow();
        assert!(actions.can_delete);
        assert!(!actions.can_rename);
        assert!(!actions.can_copy_link);
        assert!(matches!(
            app.rename_selected("x").await,
            Err(Error::NotPermitted(_))
        ));
    }

    #[tokio::test]
    async fn test_create_and_rename_reload_directory() {
        let server = Arc::new(MemoryServer::open());
        let app = start(server.clone()).await;

        let created = app.create_directory("music").await.unwrap();
        assert!(created.is_directory);
        assert_eq!(app.current().entries.len(), 1);

        let err = app.create_directory("music").await.unwrap_err();
        assert_eq!(err.user_message(), "file already exists");

        app.toggle(&created.id).unwrap();
        app.rename_selected("songs").await.unwrap();
        let current = app.current();
        assert_eq!(current.entries[0].name, "songs");
        assert!(!current.entries[0].selected);
        assert!(app.actions().can_create);
    }

    #[tokio::test]
    async fn test_delete_selected_reports_and_reloads() {
        let server = Arc::new(MemoryServer::open());
        let root = server.root_id();
        server.seed_file(&root, "a.txt", b"a");
        server.seed_dir(&root, "b");
        let app = start(server).await;

        app.select_all(true).unwrap();
        let report = app.delete_selected().await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.deleted.len(), 2);
        assert!(app.current().entries.is_empty());
        assert!(app.selection().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_stays_visible() {
        let server = Arc::new(MemoryServer::open());
        server.fail_upload("report.pdf");
        let app = start(server.clone()).await;
        let listings = server.listing_count();

        let outcomes = app
            .upload(vec![UploadSource::from_bytes("report.pdf", vec![0u8; 200 * 1024])])
            .unwrap()
            .settled()
            .await;

        assert!(!outcomes[0].is_success());
        let tasks = app.upload_tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].file_name, "report.pdf");
        assert!(tasks[0].progress.is_failed());
        assert_eq!(server.listing_count(), listings);

        assert_eq!(app.clear_failed_uploads(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_end_with_server_state() {
        let server = Arc::new(MemoryServer::open());
        let app = start(server.clone()).await;
        let listings = server.listing_count();

        let outcomes = app
            .upload(vec![
                UploadSource::from_bytes("big.bin", vec![0u8; 512 * 1024]),
                UploadSource::from_bytes("small.bin", vec![0u8; 16]),
            ])
            .unwrap()
            .settled()
            .await;
        assert!(outcomes.iter().all(|o| o.is_success()));

        // each success reloads; the final view holds both files
        assert_eq!(server.listing_count(), listings + 2);
        let names: Vec<String> = app.current().entries.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["big.bin".to_string(), "small.bin".to_string()]);
        assert!(app.upload_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_expired_token_demands_login_and_keeps_view() {
        let server = Arc::new(MemoryServer::with_login("admin", "secret", false));
        let root = server.root_id();
        server.seed_file(&root, "keep.txt", b"k");
        let app = start(server.clone()).await;
        app.login("admin", &SecretString::new("secret"))
            .await
            .unwrap();
        assert_eq!(app.current().entries.len(), 1);

        server.revoke_tokens();
        let err = app.refresh().await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(app.login_prompt_open());
        assert_eq!(app.current().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_logout_rebuilds_from_scratch() {
        let server = Arc::new(MemoryServer::with_login("admin", "secret", false));
        let store = Arc::new(MemoryTokenStore::new());
        let app = App::start(BASE, server.clone(), store.clone()).await.unwrap();
        app.login("admin", &SecretString::new("secret"))
            .await
            .unwrap();
        assert!(store.load().unwrap().is_some());
        let mut events = app.subscribe().unwrap();

        let app = app.logout().await.unwrap();

        assert!(store.load().unwrap().is_none());
        assert!(!app.is_authenticated());
        assert!(app.login_prompt_open());
        assert_eq!(app.actions(), Actions::default());

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, AppEvent::ReloadRequested);
    }

    #[tokio::test]
    async fn test_persisted_token_survives_restart() {
        let server = Arc::new(MemoryServer::with_login("admin", "secret", false));
        let store = Arc::new(MemoryTokenStore::new());
        let first = App::start(BASE, server.clone(), store.clone()).await.unwrap();
        first
            .login("admin", &SecretString::new("secret"))
            .await
            .unwrap();
        drop(first);

        let second = App::start(BASE, server, store).await.unwrap();
        assert!(second.is_authenticated());
        assert!(!second.login_prompt_open());
        assert!(second.actions().can_upload);
    }

    #[tokio::test]
    async fn test_open_url_for_files_only() {
        let server = Arc::new(MemoryServer::open());
        let root = server.root_id();
        let file = server.seed_file(&root, "my file.txt", b"x");
        let dir = server.seed_dir(&root, "d");
        let app = start(server).await;

        assert_eq!(
            app.open_url(&file).unwrap(),
            format!("{}/files/{}/my%20file.txt", BASE, file)
        );
        assert!(matches!(app.open_url(&dir), Err(Error::InvalidInput(_))));
        assert!(matches!(
            app.open_url(&EntryId::new("missing").unwrap()),
            Err(Error::NotFound(_))
        ));
    }
}

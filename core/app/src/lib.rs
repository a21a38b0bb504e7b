//! Client orchestration for filedeck.
//!
//! Keeps authentication, server configuration, the current directory,
//! the multi-selection and in-flight uploads consistent, and derives
//! which actions are enabled from them.
//!
//! # Design Principles
//! - State lives in explicit containers; every change publishes an event
//! - Enabled actions are a pure function of config, auth and selection
//! - Unauthorized responses anywhere but the token check open the login prompt
//! - A listing is applied only if no later-issued listing has been applied

pub mod app;
pub mod config_provider;
pub mod context;
pub mod directory;
pub mod events;
pub mod gate;
pub mod interceptor;
pub mod links;
pub mod selection;
pub mod session;
pub mod upload;

pub use app::{App, AppStatus};
pub use config_provider::ConfigProvider;
pub use context::AppContext;
pub use directory::{BatchDeleteReport, DeleteFailure, Directory, DirectoryStore, FileEntry};
pub use events::{AppEvent, EventBus};
pub use gate::{evaluate, Action, Actions};
pub use interceptor::ReauthGuard;
pub use selection::{SelectedEntry, Selection, SelectionModel};
pub use session::{LoginPrompt, SessionManager, SessionStatus};
pub use upload::{UploadBatch, UploadCoordinator, UploadOutcome, UploadProgress, UploadTask};

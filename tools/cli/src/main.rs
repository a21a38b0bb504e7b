//! filedeck CLI - Command line client for a remote file server.
//!
//! This tool browses directories, uploads, renames and deletes files and
//! folders, manages the login session and prints download links.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use filedeck_api::{ClientConfig, FileTokenStore, HttpServer, TokenStore, UploadSource};
use filedeck_app::{App, AppStatus, UploadOutcome};
use filedeck_common::{EntryId, Error, SecretString};

#[derive(Parser)]
#[command(name = "filedeck")]
#[command(about = "filedeck - Remote file server client")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Server base URL.
    #[arg(short, long, env = "FILEDECK_SERVER", default_value = "http://localhost:2525")]
    server: String,

    /// File holding the session token.
    #[arg(long)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the server's login settings.
    Config,

    /// Log in and remember the session.
    Login {
        /// Username (prompted if omitted).
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Forget the remembered session.
    Logout,

    /// List a directory (default: root).
    Ls {
        /// Directory id.
        dir: Option<EntryId>,
    },

    /// Create a directory.
    Mkdir {
        /// Name of the new directory.
        name: String,

        /// Parent directory id (default: root).
        #[arg(short, long)]
        parent: Option<EntryId>,
    },

    /// Rename a file or directory.
    Rename {
        /// Entry id.
        id: EntryId,

        /// New name.
        name: String,

        /// Directory holding the entry (default: root).
        #[arg(short, long)]
        dir: Option<EntryId>,
    },

    /// Delete files or directories.
    Rm {
        /// Entry ids.
        #[arg(required = true)]
        ids: Vec<EntryId>,

        /// Directory holding the entries (default: root).
        #[arg(short, long)]
        dir: Option<EntryId>,
    },

    /// Upload local files.
    Upload {
        /// Files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Target directory id (default: root).
        #[arg(short, long)]
        dir: Option<EntryId>,
    },

    /// Print the share link of a file.
    Link {
        /// File id.
        id: EntryId,

        /// Directory holding the file (default: root).
        #[arg(short, long)]
        dir: Option<EntryId>,
    },

    /// Open a file in the browser.
    Open {
        /// File id.
        id: EntryId,

        /// Directory holding the file (default: root).
        #[arg(short, long)]
        dir: Option<EntryId>,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG overrides --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let target = Target {
        server: cli.server,
        token_file: cli.token_file,
    };

    match cli.command {
        Commands::Config => cmd_config(&target).await,
        Commands::Login { username } => cmd_login(&target, username).await,
        Commands::Logout => cmd_logout(&target).await,
        Commands::Ls { dir } => cmd_ls(&target, dir.as_ref()).await,
        Commands::Mkdir { name, parent } => cmd_mkdir(&target, &name, parent.as_ref()).await,
        Commands::Rename { id, name, dir } => cmd_rename(&target, &id, &name, dir.as_ref()).await,
        Commands::Rm { ids, dir } => cmd_rm(&target, &ids, dir.as_ref()).await,
        Commands::Upload { files, dir } => cmd_upload(&target, &files, dir.as_ref()).await,
        Commands::Link { id, dir } => cmd_link(&target, &id, dir.as_ref()).await,
        Commands::Open { id, dir } => cmd_open(&target, &id, dir.as_ref()).await,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "filedeck", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Server address and token location.
struct Target {
    server: String,
    token_file: Option<PathBuf>,
}

impl Target {
    fn token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let store = match &self.token_file {
            Some(path) => FileTokenStore::new(path),
            None => FileTokenStore::default_location().context("Failed to locate token file")?,
        };
        Ok(Arc::new(store))
    }

    /// Start a session; fails if the server configuration is unavailable.
    async fn connect(&self) -> Result<App> {
        let server = HttpServer::new(ClientConfig::new(self.server.as_str()))
            .context("Invalid server address")?;
        let base_url = server.base_url().to_string();
        let app = App::start(base_url, Arc::new(server), self.token_store()?)
            .await
            .context("Failed to start session")?;

        if let AppStatus::Crashed(message) = app.status() {
            anyhow::bail!("Server unavailable: {}", message);
        }
        Ok(app)
    }

    /// Start a session and show `dir`, refusing if the server wants a login.
    async fn browse(&self, dir: Option<&EntryId>) -> Result<App> {
        let app = self.connect().await?;
        let opened = match dir {
            Some(_) => app.open_directory(dir).await.map(|_| ()),
            None => Ok(()),
        };
        if app.login_prompt_open() {
            anyhow::bail!("Login required. Run `filedeck login` first.");
        }
        opened
            .map_err(user_error)
            .context("Failed to open directory")?;
        Ok(app)
    }
}

/// Surface the server's message as is.
fn user_error(e: Error) -> anyhow::Error {
    anyhow::anyhow!(e.user_message())
}

/// Read a line from stdin after printing `prompt`.
fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

/// Show server configuration.
async fn cmd_config(target: &Target) -> Result<()> {
    let app = target.connect().await?;
    let config = app
        .config()
        .context("Server configuration unavailable")?;

    println!("Server: {}", app.base_url());
    println!("  Login required: {}", config.login_required);
    println!("  Anonymous access: {}", config.anonymous_allowed);
    println!("  Logged in: {}", app.is_authenticated());

    Ok(())
}

/// Log in interactively.
async fn cmd_login(target: &Target, username: Option<String>) -> Result<()> {
    let app = target.connect().await?;

    let username = match username {
        Some(username) => username,
        None => prompt_line("Username: ")?,
    };
    let password = SecretString::new(
        rpassword::prompt_password("Password: ").context("Failed to read password")?,
    );

    app.login(&username, &password)
        .await
        .map_err(user_error)
        .context("Login failed")?;

    println!("Logged in as {}.", username);

    Ok(())
}

/// Forget the session.
async fn cmd_logout(target: &Target) -> Result<()> {
    let app = target.connect().await?;
    app.logout().await.context("Failed to log out")?;

    println!("Logged out.");

    Ok(())
}

/// List directory contents.
async fn cmd_ls(target: &Target, dir: Option<&EntryId>) -> Result<()> {
    let app = target.browse(dir).await?;
    let current = app.current();
    let id = current.require_id()?;

    if current.entries.is_empty() {
        println!("Directory is empty.");
    } else {
        println!("Contents of {} ({}):", current.name, id);
        for entry in &current.entries {
            let kind = if entry.is_directory { "[DIR] " } else { "[FILE]" };
            println!(
                "  {} {:<36} {:>10}  {}",
                kind, entry.id, entry.size_label, entry.name
            );
        }
    }

    Ok(())
}

/// Create a directory.
async fn cmd_mkdir(target: &Target, name: &str, parent: Option<&EntryId>) -> Result<()> {
    info!("Creating directory: {}", name);

    let app = target.browse(parent).await?;
    let created = app
        .create_directory(name)
        .await
        .map_err(user_error)
        .context("Failed to create directory")?;

    println!("Directory created: {} ({})", created.name, created.id);

    Ok(())
}

/// Rename an entry.
async fn cmd_rename(target: &Target, id: &EntryId, name: &str, dir: Option<&EntryId>) -> Result<()> {
    let app = target.browse(dir).await?;
    app.set_selected(id, true)?;
    let renamed = app
        .rename_selected(name)
        .await
        .map_err(user_error)
        .context("Failed to rename")?;

    println!("Renamed {} to {}", id, renamed.name);

    Ok(())
}

/// Delete entries.
async fn cmd_rm(target: &Target, ids: &[EntryId], dir: Option<&EntryId>) -> Result<()> {
    let app = target.browse(dir).await?;
    for id in ids {
        app.set_selected(id, true)?;
    }

    let report = app
        .delete_selected()
        .await
        .map_err(user_error)
        .context("Failed to delete")?;
    if let Some(e) = &report.reload_error {
        eprintln!("Could not refresh the listing: {}", e.user_message());
    }

    for id in &report.deleted {
        println!("Deleted: {}", id);
    }
    for failure in &report.failed {
        eprintln!("Failed to delete {}: {}", failure.name, failure.error.user_message());
    }
    if !report.is_complete() {
        anyhow::bail!("{} of {} deletions failed", report.failed.len(), ids.len());
    }

    Ok(())
}

/// Upload files.
async fn cmd_upload(target: &Target, files: &[PathBuf], dir: Option<&EntryId>) -> Result<()> {
    let app = target.browse(dir).await?;

    let mut sources = Vec::with_capacity(files.len());
    for path in files {
        let source = UploadSource::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        sources.push(source);
    }

    let outcomes = app
        .upload(sources)
        .map_err(user_error)
        .context("Failed to upload")?
        .settled()
        .await;

    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            UploadOutcome::Uploaded { file_name, entry } => {
                println!("Uploaded: {} ({})", file_name, entry.id);
            }
            UploadOutcome::Failed { file_name, error } => {
                failed += 1;
                eprintln!("Failed: {} ({})", file_name, error.user_message());
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} uploads failed", failed, outcomes.len());
    }

    Ok(())
}

/// Print a share link.
async fn cmd_link(target: &Target, id: &EntryId, dir: Option<&EntryId>) -> Result<()> {
    let app = target.browse(dir).await?;
    app.set_selected(id, true)?;
    let link = app
        .share_link()
        .map_err(user_error)
        .context("Cannot share this entry")?;

    println!("{}", link);

    Ok(())
}

/// Open a file in the browser.
async fn cmd_open(target: &Target, id: &EntryId, dir: Option<&EntryId>) -> Result<()> {
    let app = target.browse(dir).await?;
    let url = app.open_url(id)?;

    println!("Opening {}", url);
    open::that(&url).context("Failed to open browser")?;

    Ok(())
}

//! # carelink
//!
//! Carelink messaging server binary: loads settings, opens the store, wires
//! the chat core, and serves `WebSocket` and REST until Ctrl-C.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use carelink_auth::JwtIdentityService;
use carelink_chat::{ChatConfig, ChatDeps, ChatService, LocalMediaStore};
use carelink_logging::{LogFormat, init_subscriber};
use carelink_server::{CarelinkServer, ServerConfig};
use carelink_settings::{CarelinkSettings, load_settings_from_path, resolve_in_home, settings_path};
use carelink_store::{ConnectionConfig, SqliteChatStore, new_file};
use clap::{Args, Parser, Subcommand};

/// Carelink messaging server.
#[derive(Parser, Debug)]
#[command(name = "carelink", about = "Clinic messaging server", version)]
struct Cli {
    /// Settings file (defaults to `~/.carelink/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run migrations and serve until Ctrl-C (default).
    Serve(ServeArgs),
    /// Print a signed development token.
    Token(TokenArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Directory for uploaded attachments.
    #[arg(long)]
    media_dir: Option<PathBuf>,
}

impl ServeArgs {
    /// Flags win over settings file and environment.
    fn apply(&self, settings: &mut CarelinkSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.storage.db_path = path.display().to_string();
        }
        if let Some(dir) = &self.media_dir {
            settings.media.directory = dir.display().to_string();
        }
    }
}

#[derive(Args, Debug)]
struct TokenArgs {
    /// Subject (user id).
    #[arg(long)]
    user: String,

    /// Role claim: `caregiver`, `doctor`, or `patient`.
    #[arg(long)]
    role: String,

    /// Lifetime in seconds (defaults to `auth.tokenTtlSecs`).
    #[arg(long)]
    ttl_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    match cli.command.unwrap_or_else(|| Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => {
            args.apply(&mut settings);
            serve(settings).await
        }
        Command::Token(args) => {
            let token = issue_token(&settings, &args)?;
            println!("{token}");
            Ok(())
        }
    }
}

fn identity_service(settings: &CarelinkSettings) -> Result<JwtIdentityService> {
    let auth = &settings.auth;
    if auth.jwt_secret.is_empty() {
        bail!("auth.jwtSecret is not set (settings file or CARELINK_JWT_SECRET)");
    }
    JwtIdentityService::new(&auth.jwt_secret, &auth.jwt_algorithm, auth.leeway_secs)
        .context("Invalid JWT configuration")
}

fn issue_token(settings: &CarelinkSettings, args: &TokenArgs) -> Result<String> {
    let ttl = args.ttl_secs.unwrap_or(settings.auth.token_ttl_secs);
    let ttl = i64::try_from(ttl).context("--ttl-secs is too large")?;
    identity_service(settings)?
        .issue(&args.user, &args.role, ttl)
        .context("Failed to sign token")
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn open_store(settings: &CarelinkSettings) -> Result<SqliteChatStore> {
    let db_path = resolve_in_home(&settings.storage.db_path);
    ensure_parent_dir(&db_path)?;
    let db_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;

    let config = ConnectionConfig {
        pool_size: settings.storage.pool_size,
        busy_timeout_ms: u32::try_from(settings.storage.busy_timeout_ms).unwrap_or(u32::MAX),
        ..ConnectionConfig::default()
    };
    let pool = new_file(db_str, &config)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    let store = SqliteChatStore::new(pool);
    let version = store.migrate().context("Failed to run migrations")?;
    tracing::info!(path = %db_path.display(), schema_version = version, "database ready");
    Ok(store)
}

fn chat_config(settings: &CarelinkSettings) -> ChatConfig {
    ChatConfig {
        max_text_chars: settings.chat.max_text_chars,
        history_default_limit: settings.chat.history_default_limit,
        history_max_limit: settings.chat.history_max_limit,
        max_connections: settings.server.max_connections,
    }
}

async fn serve(settings: CarelinkSettings) -> Result<()> {
    init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    let identity = identity_service(&settings)?;
    let store = Arc::new(open_store(&settings)?);
    let media_root = resolve_in_home(&settings.media.directory);
    let attachments = LocalMediaStore::new(&media_root, settings.media.public_base_url.clone());

    let chat = ChatService::new(
        ChatDeps {
            identity: Arc::new(identity),
            directory: store.clone(),
            assignments: store.clone(),
            conversations: store.clone(),
            messages: store,
            attachments: Arc::new(attachments),
        },
        chat_config(&settings),
    );

    let metrics = carelink_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = CarelinkServer::new(ServerConfig::from_settings(&settings), Arc::new(chat), metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        media = %media_root.display(),
        max_connections = settings.server.max_connections,
        "Carelink listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(vec![handle], None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

//! Stockly CLI - generate and browse AI images from the terminal.
//!
//! Sign in once with `stockly login` (or Google via `stockly google-url` and
//! `stockly google-callback`); tokens are kept in the OS keychain and
//! refreshed automatically.

mod commands;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stockly_core::api::{ApiClient, DEFAULT_HISTORY_LIMIT};
use stockly_core::auth::{AuthEvents, SessionContext};
use stockly_core::Config;

use commands::CliNavigator;

#[derive(Debug, Parser)]
#[command(name = "stockly", version, about = "Generate and browse AI images with Stockly")]
struct Cli {
    /// API host, e.g. http://localhost:8000
    #[arg(long, global = true, env = "STOCKLY_API_URL")]
    api_url: Option<String>,

    /// Print raw JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        /// Account email; defaults to the last one used
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account with email and password
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Print the Google sign-in URL
    GoogleUrl,
    /// Finish Google sign-in with the code from the redirect URL
    GoogleCallback { code: String },
    /// Show the signed-in profile
    Whoami,
    /// Update the signed-in profile
    UpdateProfile {
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
    /// Generate images from a prompt
    Generate {
        prompt: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// List previous generations, newest first
    History {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: u32,
    },
    /// Delete one or more generations
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show configuration and session state
    Status,
}

impl Command {
    /// Web view each command corresponds to.
    fn view_path(&self) -> &'static str {
        match self {
            Command::Login { .. } | Command::GoogleUrl | Command::Status => "/signin",
            Command::Register { .. } => "/signup",
            Command::GoogleCallback { .. } => "/auth/callback",
            Command::Whoami | Command::Logout => "/profile",
            Command::UpdateProfile { .. } => "/account-settings",
            Command::Generate { .. } => "/",
            Command::History { .. } | Command::Delete { .. } => "/gallery",
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let mut config = Config::load()?;
    let base_url = cli.api_url.clone().unwrap_or_else(|| config.api_base_url());
    info!(api = %base_url, backend = ?config.credential_backend, "Stockly CLI starting");

    let events = AuthEvents::new();
    let navigator = Arc::new(CliNavigator::new(cli.command.view_path()));
    let session = SessionContext::new(config.credential_store()?, events, navigator);

    let client = ApiClient::builder()
        .base_url(&base_url)
        .session(session)
        .timeout(config.timeout())
        .build()?;

    let output = commands::Output { json: cli.json };
    match cli.command {
        Command::Login { email } => commands::login(&client, &mut config, email).await,
        Command::Register {
            email,
            first_name,
            last_name,
        } => commands::register(&client, email, first_name, last_name).await,
        Command::GoogleUrl => commands::google_url(&client).await,
        Command::GoogleCallback { code } => commands::google_callback(&client, &code).await,
        Command::Whoami => commands::whoami(&client, output).await,
        Command::UpdateProfile {
            first_name,
            last_name,
            name,
            avatar_url,
        } => {
            let update = stockly_core::models::UserUpdate {
                first_name,
                last_name,
                name,
                avatar_url,
            };
            commands::update_profile(&client, &update, output).await
        }
        Command::Generate { prompt, category } => {
            commands::generate(&client, &prompt, category.as_deref(), output).await
        }
        Command::History { skip, limit } => commands::history(&client, skip, limit, output).await,
        Command::Delete { ids } => commands::delete(&client, &ids).await,
        Command::Logout => commands::logout(&client),
        Command::Status => commands::status(&client, &config, &base_url).await,
    }
}

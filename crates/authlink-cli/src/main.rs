//! authlink - log in to a JSON API and issue authenticated requests.
//!
//! The access token is kept in a persisted cookie jar between runs and is
//! refreshed automatically when the API rejects it.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use authlink_core::{ApiClient, ApiClients, ApiRequest, ClientConfig, CookieJar, TokenStore};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "authlink", version, about = "Bearer-token client for a JSON API")]
struct Cli {
    /// Config file (JSON). Defaults to ~/.config/authlink/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where the access token cookie is persisted
    #[arg(long, global = true)]
    cookie_file: Option<PathBuf>,

    /// Send requests without the access token
    #[arg(long, global = true)]
    no_auth: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and store the access token
    Login {
        email: String,
        #[arg(long, env = "AUTHLINK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account and store the access token
    Register {
        email: String,
        #[arg(long, env = "AUTHLINK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// End the session and remove the stored token
    Logout,
    /// GET a path and print the JSON response
    Get { path: String },
    /// POST a JSON body to a path and print the JSON response
    Post {
        path: String,
        /// Request body as JSON
        #[arg(long, default_value = "{}")]
        data: String,
    },
    /// DELETE a path and print the JSON response
    Delete { path: String },
    /// Inspect or edit the stored access token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Debug, Subcommand)]
enum TokenAction {
    Show,
    Set { token: String },
    Clear,
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

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    if let Some(ref path) = cli.cookie_file {
        config.cookie_file = Some(path.clone());
    }
    Ok(config)
}

fn open_store(config: &ClientConfig) -> Result<TokenStore> {
    let path = match config.cookie_file {
        Some(ref path) => path.clone(),
        None => ClientConfig::default_cookie_file()?,
    };
    let jar = CookieJar::open(&path).context("Failed to open cookie jar")?;
    debug!(path = %path.display(), "Token store opened");
    Ok(TokenStore::new(Arc::new(jar), config.cookie.clone()))
}

fn prompt_password(given: Option<String>) -> Result<String> {
    match given {
        Some(password) => Ok(password),
        None => Ok(rpassword::prompt_password("Password: ")?),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn request(client: &ApiClient, request: ApiRequest) -> Result<()> {
    let path = request.path().to_string();
    let value: serde_json::Value = client
        .fetch_json(&request)
        .await
        .with_context(|| format!("Request to {} failed", path))?;
    print_json(&value)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let store = open_store(&config)?;
    info!(base_url = %config.base_url, "authlink starting");

    let clients = ApiClients::new(config, store.clone())?;
    let client = if cli.no_auth {
        &clients.classic
    } else {
        &clients.with_auth
    };

    match cli.command {
        Command::Login { email, password } => {
            let password = prompt_password(password)?;
            clients
                .auth_service()
                .login(&email, &password)
                .await
                .context("Login failed")?;
            println!("Login successful");
        }
        Command::Register { email, password } => {
            let password = prompt_password(password)?;
            clients
                .auth_service()
                .register(&email, &password)
                .await
                .context("Registration failed")?;
            println!("Registration successful");
        }
        Command::Logout => {
            clients.auth_service().logout().await.context("Logout failed")?;
            println!("Logged out");
        }
        Command::Get { path } => request(client, ApiRequest::get(path)).await?,
        Command::Post { path, data } => {
            let body: serde_json::Value =
                serde_json::from_str(&data).context("--data must be valid JSON")?;
            request(client, ApiRequest::post(path).json(&body)?).await?
        }
        Command::Delete { path } => request(client, ApiRequest::delete(path)).await?,
        Command::Token { action } => match action {
            TokenAction::Show => match store.get() {
                Some(token) => println!("{}", token),
                None => println!("No access token stored"),
            },
            TokenAction::Set { token } => {
                store.set(&token)?;
                println!("Access token saved");
            }
            TokenAction::Clear => {
                store.remove()?;
                println!("Access token removed");
            }
        },
    }

    Ok(())
}

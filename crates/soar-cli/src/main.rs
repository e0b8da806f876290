// crates/soar-cli/src/main.rs
// ============================================================================
// Module: SOAR CLI Entry Point
// Description: Command dispatcher for local server hosting and remote
//              playbook/execution/approval/webhook administration.
// Purpose: Give operators a single binary for both running and driving a
//          soar-api deployment.
// Dependencies: clap, reqwest, soar-api, soar-config, soar-core,
//               soar-store-sqlite, tokio, tracing
// ============================================================================

//! ## Overview
//! `soar serve` hosts an in-process `soar-api` server against a SQLite entity
//! store. Every other subcommand is a thin HTTP client against a running
//! server (local or remote), addressed by `--server`. Nothing here talks to
//! the engine or the store directly outside of `serve`; administration always
//! goes through the same REST surface an external operator would use.

#![deny(missing_docs)]
#![deny(unsafe_code)]

use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use reqwest::Client;
use serde_json::Value;
use soar_core::model::PlaybookDsl;
use soar_core::validator::validate_playbook;
use soar_core::Clock;
use soar_core::Engine;
use soar_core::SystemClock;
use soar_store_sqlite::SqliteStore;
use soar_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

/// Default address the CLI talks to when `--server` is not given.
const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

#[derive(Parser, Debug)]
#[command(name = "soar", about = "SOAR playbook engine server and admin CLI")]
struct Cli {
    /// Base URL of a running soar-api server, for every subcommand but `serve`.
    #[arg(long, global = true, default_value = DEFAULT_SERVER)]
    server: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the soar-api HTTP server against a SQLite entity store.
    Serve(ServeArgs),
    /// Playbook authoring utilities.
    Playbook {
        #[command(subcommand)]
        command: PlaybookCommand,
    },
    /// Execution inspection and control.
    Execution {
        #[command(subcommand)]
        command: ExecutionCommand,
    },
    /// Approval resolution.
    Approval {
        #[command(subcommand)]
        command: ApprovalCommand,
    },
    /// Webhook endpoint administration.
    Webhook {
        #[command(subcommand)]
        command: WebhookCommand,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: SocketAddr,
    /// Path to the SQLite entity store file.
    #[arg(long, default_value = "soar.sqlite3")]
    store: PathBuf,
    /// Optional `soar.toml` configuration file; falls back to env and defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum PlaybookCommand {
    /// Validate a playbook DSL file without uploading it.
    Validate(PlaybookFileArgs),
    /// Validate and create (or update, if `--id` is given) a playbook.
    Load(PlaybookLoadArgs),
}

#[derive(Args, Debug)]
struct PlaybookFileArgs {
    /// Path to a JSON file containing a `PlaybookDsl`.
    path: PathBuf,
}

#[derive(Args, Debug)]
struct PlaybookLoadArgs {
    /// Path to a JSON file containing a `PlaybookDsl`.
    path: PathBuf,
    /// Display name for the playbook.
    #[arg(long)]
    name: String,
    /// Existing playbook id to create a new version under, instead of a new one.
    #[arg(long)]
    id: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ExecutionCommand {
    /// Fetch and print an execution's current state and history.
    Inspect(ExecutionIdArgs),
    /// List open (non-terminal) executions.
    List(ExecutionListArgs),
    /// Force-cancel an in-flight execution.
    Cancel(ExecutionIdArgs),
}

#[derive(Args, Debug)]
struct ExecutionIdArgs {
    /// Execution id.
    id: String,
}

#[derive(Args, Debug)]
struct ExecutionListArgs {
    /// Restrict the listing to one playbook id.
    #[arg(long)]
    playbook_id: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ApprovalCommand {
    /// List pending approvals.
    List,
    /// Approve a pending approval.
    Approve(ApprovalDecisionArgs),
    /// Reject a pending approval.
    Reject(ApprovalDecisionArgs),
}

#[derive(Args, Debug)]
struct ApprovalDecisionArgs {
    /// Approval id.
    id: String,
    /// Identity of the human making the decision.
    #[arg(long)]
    decided_by: Option<String>,
}

#[derive(Subcommand, Debug)]
enum WebhookCommand {
    /// Register a new webhook endpoint.
    Create(WebhookCreateArgs),
    /// List registered webhooks.
    List,
    /// Rotate a webhook's HMAC secret.
    RotateSecret(WebhookIdArgs),
}

#[derive(Args, Debug)]
struct WebhookCreateArgs {
    /// Reject requests without a matching HMAC signature.
    #[arg(long, default_value_t = true)]
    require_hmac: bool,
}

#[derive(Args, Debug)]
struct WebhookIdArgs {
    /// Webhook id.
    id: String,
}

/// Top-level CLI failure.
#[derive(Debug, Error)]
enum CliError {
    /// A local file could not be read or parsed.
    #[error("failed to read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    /// A file's contents were not valid JSON.
    #[error("invalid JSON in {path}: {source}")]
    InvalidJson { path: PathBuf, source: serde_json::Error },
    /// Playbook validation reported blocking errors.
    #[error("playbook validation failed with {0} error(s)")]
    ValidationFailed(usize),
    /// An HTTP request to the server failed.
    #[error("request to {server} failed: {source}")]
    Request { server: String, source: reqwest::Error },
    /// The server returned a non-success status.
    #[error("server returned {status}: {body}")]
    ServerError { status: reqwest::StatusCode, body: String },
    /// Configuration failed to load.
    #[error("config error: {0}")]
    Config(#[from] soar_config::SoarConfigError),
    /// The SQLite store could not be opened.
    #[error("store error: {0}")]
    Store(#[from] soar_store_sqlite::SqliteStoreError),
    /// A store operation failed after the store was opened.
    #[error("store operation failed: {0}")]
    StoreOp(String),
    /// The HTTP server failed to start or serve.
    #[error("server error: {0}")]
    Server(#[from] soar_api::server::ServerError),
    /// Writing a result to stdout failed.
    #[error("failed to write output: {0}")]
    Output(std::io::Error),
}

fn read_dsl(path: &PathBuf) -> Result<PlaybookDsl, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::ReadFile { path: path.clone(), source })?;
    serde_json::from_str(&raw).map_err(|source| CliError::InvalidJson { path: path.clone(), source })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = write_stderr_line(&format!("error: {error}"));
            ExitCode::FAILURE
        }
    }
}

/// Writes a single line to stdout, bypassing the `println!` clippy lint.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr, bypassing the `eprintln!` clippy lint.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Playbook { command } => playbook(&cli.server, command).await,
        Commands::Execution { command } => execution(&cli.server, command).await,
        Commands::Approval { command } => approval(&cli.server, command).await,
        Commands::Webhook { command } => webhook(&cli.server, command).await,
    }
}

async fn serve(args: ServeArgs) -> Result<(), CliError> {
    let config = Arc::new(soar_config::SoarConfig::load(args.config.as_deref())?);
    let store_config = SqliteStoreConfig::new(args.store);
    let store = Arc::new(SqliteStore::open(&store_config)?);

    let connector_records = soar_core::store::ConnectorStore::list(store.as_ref()).map_err(CliError::StoreOp)?;
    let (registry, failures) = soar_api::connector_registry::build_registry(&connector_records);
    for (connector_id, error) in &failures {
        tracing::warn!(connector_id, %error, "connector failed to register at startup");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Arc::new(
        Engine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(registry),
            store.clone(),
            store.clone(),
            clock,
        )
        .with_max_step_executions(config.engine.max_step_executions),
    );

    let state = soar_api::build_state(
        engine,
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        config,
    );
    soar_api::serve(args.bind, state).await?;
    Ok(())
}

fn client() -> Client {
    Client::new()
}

async fn get_json(server: &str, path: &str) -> Result<Value, CliError> {
    let url = format!("{server}{path}");
    let response = client().get(&url).send().await.map_err(|source| CliError::Request { server: server.to_string(), source })?;
    check_status(response).await
}

async fn post_json(server: &str, path: &str, body: &Value) -> Result<Value, CliError> {
    let url = format!("{server}{path}");
    let response = client().post(&url).json(body).send().await.map_err(|source| CliError::Request { server: server.to_string(), source })?;
    check_status(response).await
}

async fn patch_json(server: &str, path: &str, body: &Value) -> Result<Value, CliError> {
    let url = format!("{server}{path}");
    let response = client().patch(&url).json(body).send().await.map_err(|source| CliError::Request { server: server.to_string(), source })?;
    check_status(response).await
}

async fn check_status(response: reqwest::Response) -> Result<Value, CliError> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(CliError::ServerError { status, body });
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body).unwrap_or(Value::Null))
}

fn print_pretty(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    write_stdout_line(&rendered).map_err(CliError::Output)
}

async fn playbook(server: &str, command: PlaybookCommand) -> Result<(), CliError> {
    match command {
        PlaybookCommand::Validate(args) => {
            let dsl = read_dsl(&args.path)?;
            let issues = validate_playbook(&dsl);
            let error_count = issues.iter().filter(|issue| issue.severity == soar_core::validator::ValidationSeverity::Error).count();
            print_pretty(&serde_json::to_value(&issues).unwrap_or(Value::Null))?;
            if error_count > 0 {
                return Err(CliError::ValidationFailed(error_count));
            }
            write_stdout_line("playbook is valid").map_err(CliError::Output)?;
            Ok(())
        }
        PlaybookCommand::Load(args) => {
            let dsl = read_dsl(&args.path)?;
            let body = serde_json::json!({"name": args.name, "dsl": dsl});
            let response = match args.id {
                Some(id) => put_json(server, &format!("/playbooks/{id}"), &body).await?,
                None => post_json(server, "/playbooks", &body).await?,
            };
            print_pretty(&response)?;
            Ok(())
        }
    }
}

async fn put_json(server: &str, path: &str, body: &Value) -> Result<Value, CliError> {
    let url = format!("{server}{path}");
    let response = client().put(&url).json(body).send().await.map_err(|source| CliError::Request { server: server.to_string(), source })?;
    check_status(response).await
}

async fn execution(server: &str, command: ExecutionCommand) -> Result<(), CliError> {
    match command {
        ExecutionCommand::Inspect(args) => {
            let response = get_json(server, &format!("/executions/{}", args.id)).await?;
            print_pretty(&response)?;
            Ok(())
        }
        ExecutionCommand::List(args) => {
            let path = match args.playbook_id {
                Some(id) => format!("/executions?playbook_id={id}"),
                None => "/executions".to_string(),
            };
            let response = get_json(server, &path).await?;
            print_pretty(&response)?;
            Ok(())
        }
        ExecutionCommand::Cancel(args) => {
            patch_json(server, &format!("/executions/{}/cancel", args.id), &Value::Null).await?;
            write_stdout_line(&format!("cancelled {}", args.id)).map_err(CliError::Output)?;
            Ok(())
        }
    }
}

async fn approval(server: &str, command: ApprovalCommand) -> Result<(), CliError> {
    match command {
        ApprovalCommand::List => {
            let response = get_json(server, "/approvals").await?;
            print_pretty(&response)?;
            Ok(())
        }
        ApprovalCommand::Approve(args) => {
            let body = serde_json::json!({"decided_by": args.decided_by});
            post_json(server, &format!("/approvals/{}/approve", args.id), &body).await?;
            write_stdout_line(&format!("approved {}", args.id)).map_err(CliError::Output)?;
            Ok(())
        }
        ApprovalCommand::Reject(args) => {
            let body = serde_json::json!({"decided_by": args.decided_by});
            post_json(server, &format!("/approvals/{}/reject", args.id), &body).await?;
            write_stdout_line(&format!("rejected {}", args.id)).map_err(CliError::Output)?;
            Ok(())
        }
    }
}

async fn webhook(server: &str, command: WebhookCommand) -> Result<(), CliError> {
    match command {
        WebhookCommand::Create(args) => {
            let body = serde_json::json!({"require_hmac": args.require_hmac});
            let response = post_json(server, "/webhooks", &body).await?;
            print_pretty(&response)?;
            Ok(())
        }
        WebhookCommand::List => {
            let response = get_json(server, "/webhooks").await?;
            print_pretty(&response)?;
            Ok(())
        }
        WebhookCommand::RotateSecret(args) => {
            let response = post_json(server, &format!("/webhooks/{}/rotate-secret", args.id), &Value::Null).await?;
            print_pretty(&response)?;
            Ok(())
        }
    }
}

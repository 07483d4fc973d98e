//! Command-line front end for the request pipeline.
//!
//! Issues one call through the full pipeline (CSRF handling, session refresh,
//! timeouts) and prints the normalized payload or the typed error.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use session_pipeline::config::{load_config, ClientConfig};
use session_pipeline::observability::logging::init_logging;
use session_pipeline::{ApiClient, ClientError, RequestOptions, TimeoutProfile};

#[derive(Parser)]
#[command(name = "session-pipeline")]
#[command(about = "Issue API calls through the resilient session pipeline", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured base URL.
    #[arg(short, long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET a path
    Get { path: String },
    /// POST a JSON body
    Post(BodyArgs),
    /// PUT a JSON body
    Put(BodyArgs),
    /// PATCH a JSON body
    Patch(BodyArgs),
    /// DELETE a path
    Delete { path: String },
    /// Fetch a fresh anti-forgery token
    Csrf,
}

#[derive(clap::Args)]
struct BodyArgs {
    path: String,

    /// JSON request body.
    #[arg(short, long, default_value = "{}")]
    data: String,

    /// Use the large-payload timeout profile.
    #[arg(long)]
    large: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    init_logging(&config.observability);

    let client = ApiClient::new(config)?;
    let mut expired = client.subscribe_session_expired();
    tokio::spawn(async move {
        while let Ok(event) = expired.recv().await {
            eprintln!("Session expired ({:?}) while calling {}; log in again", event.reason, event.path);
        }
    });

    let result = match cli.command {
        Commands::Get { path } => client.get::<Value>(&path).await,
        Commands::Delete { path } => client.delete::<Value>(&path).await,
        Commands::Post(args) => send_body(&client, reqwest::Method::POST, args).await,
        Commands::Put(args) => send_body(&client, reqwest::Method::PUT, args).await,
        Commands::Patch(args) => send_body(&client, reqwest::Method::PATCH, args).await,
        Commands::Csrf => client
            .refresh_csrf_token()
            .await
            .map(|token| serde_json::json!({ "csrf_token": token })),
    };

    match result {
        Ok(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Err(ClientError::Api(e)) => {
            eprintln!("Error: {}", e);
            if let Some(request_id) = &e.request_id {
                eprintln!("Request ID: {}", request_id);
            }
            if let Some(secs) = e.retry_after_seconds {
                eprintln!("Retry after: {}s", secs);
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

async fn send_body(
    client: &ApiClient,
    method: reqwest::Method,
    args: BodyArgs,
) -> Result<Value, ClientError> {
    let body: Value = serde_json::from_str(&args.data)?;
    let profile = if args.large {
        TimeoutProfile::LargePayload
    } else {
        TimeoutProfile::Standard
    };
    let options = RequestOptions::new(method).with_body(body).with_timeout(profile);
    client.request(&args.path, options).await
}

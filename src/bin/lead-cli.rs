use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN};
use serde_json::{json, Value};

use lead_intake::config::load_from_env;
use lead_intake::identity::IdentityHasher;
use lead_intake::lifecycle::build_crm_engine;
use lead_intake::observability::logging;
use lead_intake::store;

#[derive(Parser)]
#[command(name = "lead-cli")]
#[command(about = "Operations CLI for the lead intake service", long_about = None)]
struct Cli {
    /// Base URL of a running intake server.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health and limiter backend
    Health,
    /// Post a test lead to the contact endpoint
    Submit {
        #[arg(long, default_value = "Ann Lee")]
        name: String,
        #[arg(long, default_value = "ann@example.com")]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long, default_value = "Hello, I need help with my project.")]
        message: String,
        /// Origin header to send; defaults to the server URL.
        #[arg(long)]
        origin: Option<String>,
    },
    /// Retry CRM sync for leads marked needs_sync
    Reconcile {
        /// Config file; falls back to LEAD_INTAKE_CONFIG, then defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Submit {
            name,
            email,
            phone,
            message,
            origin,
        } => {
            let mut headers = HeaderMap::new();
            let origin = origin.unwrap_or_else(|| cli.url.clone());
            headers.insert(ORIGIN, HeaderValue::from_str(&origin)?);

            let res = client
                .post(format!("{}/api/contact", cli.url))
                .headers(headers)
                .json(&json!({
                    "name": name,
                    "email": email,
                    "phone": phone,
                    "message": message,
                }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Reconcile { config, limit } => {
            let config = load_from_env(config.as_deref())?;
            logging::init_logging(&config.observability);

            let store = store::from_config(&config.store)?;
            let hasher = IdentityHasher::new(config.hashing.clone());
            let Some(engine) = build_crm_engine(&config, store, hasher)? else {
                eprintln!("Error: CRM sync is disabled in the configuration");
                return Ok(());
            };

            let summary = engine.reconcile(limit).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "examined": summary.examined,
                    "synced": summary.synced,
                    "still_pending": summary.still_pending,
                }))?
            );
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use noa_client::client::{ApiClient, ApiError, ApiResponse, ProgressCallback};
use noa_client::config::{load_config, override_base_url, ClientConfig};
use noa_client::observability::{logging, metrics};
use noa_client::services::{SourceService, UserService};
use noa_client::session::SessionEvent;

#[derive(Parser)]
#[command(name = "noa-cli")]
#[command(about = "Command-line client for the N.O.A API", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the API base URL.
    #[arg(short = 'u', long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// End the session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Check that the stored session is still accepted
    Validate,
    /// GET an arbitrary API path
    Get { path: String },
    /// DELETE an arbitrary API path
    Delete { path: String },
    /// List uploaded knowledge files
    Files {
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Upload a knowledge file
    Upload { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config = override_base_url(config, base_url)?;
    }

    logging::init_logging(&config.observability)?;

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr)?;
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let client = ApiClient::from_config(&config)?;
    let mut session_events = client.events().subscribe();

    let result = run(cli.command, &client).await;

    if let Ok(SessionEvent::Expired { login_path, reason }) = session_events.try_recv() {
        eprintln!("Session expired ({}). Sign in again with `noa-cli login` [{}].", reason, login_path);
    }

    if let Err(e) = result {
        eprintln!("Error: API returned status {}: {}", e.status, e.message);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Commands, client: &ApiClient) -> Result<(), ApiError> {
    let users = UserService::new(client.clone());
    let sources = SourceService::new(client.clone());

    match command {
        Commands::Login { username, password } => {
            users.login(&username, &password).await?;
            println!("Logged in as {}", username);
        }
        Commands::Logout => {
            users.logout().await?;
            println!("Logged out");
        }
        Commands::Whoami => {
            let me = users.current_user().await?;
            println!("{} <{}> ({})", me.data.full_name, me.data.email, me.data.license_type);
        }
        Commands::Validate => print_response(users.validate_session().await?),
        Commands::Get { path } => print_response(client.get::<Value>(&path).await?),
        Commands::Delete { path } => print_response(client.delete::<Value>(&path).await?),
        Commands::Files { section } => print_response(sources.list_files(section.as_deref()).await?),
        Commands::Upload { file } => {
            let progress: ProgressCallback = Arc::new(|pct: u8| {
                eprint!("\rUploading... {:>3}%", pct);
                let _ = std::io::stderr().flush();
            });
            let response = sources.upload_file(&file, Some(progress)).await;
            eprintln!();
            print_response(response?);
        }
    }

    Ok(())
}

fn print_response(response: ApiResponse<Value>) {
    match serde_json::to_string_pretty(&response.data) {
        Ok(json) => println!("{}", json),
        Err(_) => println!("{}", response.data),
    }
}

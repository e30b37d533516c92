use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::metadata::LevelFilter;

use llmhub_models::commands;
use llmhub_models::config::Settings;
use llmhub_models::convert::Converter;
use llmhub_models::hub::HfHub;
use llmhub_models::models::{Catalog, HttpFetcher};
use llmhub_models::output::Console;

/// Fetch, convert and place on-device Gemma 3 models.
#[derive(Parser)]
#[command(
    name = "llmhub-models",
    version = env!("CARGO_PKG_VERSION"),
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog models and whether they are present locally
    List,
    /// Download one pre-built bundle
    Download { id: String, dir: Option<PathBuf> },
    /// Download every pre-built bundle
    DownloadAll { dir: Option<PathBuf> },
    /// Snapshot a hub repository and convert it into a bundle
    Convert { id: String, dir: Option<PathBuf> },
    /// Convert every hub model
    ConvertAll { dir: Option<PathBuf> },
    /// Copy bundles into the Android assets directory
    Setup,
    /// Show the bundles in the models and assets directories
    Check,
    /// Check a local bundle against the catalog size and digest
    Verify { id: String, dir: Option<PathBuf> },
    /// Report hub login state and write a manual download script
    Auth { dir: Option<PathBuf> },
    /// Print the manual conversion guide
    Guide,
}

fn setup_logging() {
    let filter = std::env::var("LLMHUB_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(command: Commands, console: &mut Console) -> Result<()> {
    let settings = Settings::load()?;
    let catalog = Catalog::load(&settings)?;
    tracing::debug!("catalog holds {} models", catalog.len());

    match command {
        Commands::List => commands::list(&catalog, &settings.models_dir, console),
        Commands::Download { id, dir } => {
            let fetcher = HttpFetcher::new()?;
            commands::download(&fetcher, &catalog, &id, &settings.models_dir_or(dir), console);
        }
        Commands::DownloadAll { dir } => {
            let fetcher = HttpFetcher::new()?;
            commands::download_all(&fetcher, &catalog, &settings.models_dir_or(dir), console);
        }
        Commands::Convert { id, dir } => {
            let hub = hub_client(&settings)?;
            let converter = Converter::from_settings(&settings.converter);
            commands::convert(
                &hub,
                &converter,
                &catalog,
                &id,
                &settings.models_dir_or(dir),
                console,
            );
        }
        Commands::ConvertAll { dir } => {
            let hub = hub_client(&settings)?;
            let converter = Converter::from_settings(&settings.converter);
            let dir = settings.models_dir_or(dir);
            commands::convert_all(&hub, &converter, &catalog, &dir, console);
        }
        Commands::Setup => commands::setup(&settings, console)?,
        Commands::Check => commands::check(&settings, console)?,
        Commands::Verify { id, dir } => {
            commands::verify(&catalog, &id, &settings.models_dir_or(dir), console)?;
        }
        Commands::Auth { dir } => {
            let hub = hub_client(&settings)?;
            commands::auth(&hub, &catalog, &settings.models_dir_or(dir), console)?;
        }
        Commands::Guide => commands::guide(console),
    }
    Ok(())
}

fn hub_client(settings: &Settings) -> Result<HfHub> {
    let hub = HfHub::from_settings(&settings.hub)?;
    if !hub.has_token() {
        tracing::info!("no hub token found; gated repositories will be refused");
    }
    Ok(hub)
}

fn main() {
    setup_logging();
    let cli = Cli::parse();
    let mut console = Console::stdout();
    if let Err(error) = run(cli.command, &mut console) {
        tracing::error!("{error:#}");
        console.line(format!("Error: {error:#}"));
    }
}

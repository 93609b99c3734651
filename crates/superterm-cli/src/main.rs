use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use superterm_core::{models::OllamaClient, session::Session, settings::Settings};
use tracing_subscriber::EnvFilter;
mod ui;
use ui::app::App;

/// SuperTerm - a shell that asks a local model when you prefix a line with '!'
#[derive(Parser)]
#[command(name = "superterm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/superterm/config.toml)
    #[arg(long, global = true, env = "SUPERTERM_CONFIG")]
    config: Option<PathBuf>,

    /// Ollama endpoint, e.g. localhost:11434
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Model to ask
    #[arg(long, global = true)]
    model: Option<String>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the model server is up and the model is installed
    Check,
    /// Print the effective configuration
    Config,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(endpoint) = cli.endpoint {
        settings.endpoint = endpoint;
    }
    if let Some(model) = cli.model {
        settings.model = model;
    }
    settings.is_valid().context("invalid settings")?;

    match cli.command {
        None => run_shell(settings).await,
        Some(Commands::Check) => check(&settings).await,
        Some(Commands::Config) => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
        Some(Commands::Init { force }) => init(cli.config, force),
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

async fn run_shell(settings: Settings) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot read current directory")?;
    let client = OllamaClient::new(&settings);

    if let Err(e) = client.check_availability().await {
        eprintln!("⚠️  {}", e);
    }

    let session = Session::new(settings, client, cwd);
    let mut app = App::new(session);
    app.run().await
}

async fn check(settings: &Settings) -> Result<()> {
    let client = OllamaClient::new(settings);

    println!("🔎 Checking Ollama at {}...", client.base_url());
    let models = client
        .list_models()
        .await
        .context("model server is not reachable")?;
    println!("✅ Ollama is running.");

    for model in &models {
        println!("   - {} ({})", model.name, model.size);
    }

    match client.check_availability().await {
        Ok(()) => {
            println!("✅ Model '{}' found.", client.model());
            Ok(())
        }
        Err(e) => bail!("{}", e),
    }
}

fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path.or_else(Settings::default_path) {
        Some(path) => path,
        None => bail!("could not determine where to write the config file; pass --config"),
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    Settings::default()
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

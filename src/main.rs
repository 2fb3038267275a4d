use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{
    ConfigCommand, FilesCommand, LoginCommand, PushCommand, ReposCommand, SaveCommand,
    ShowCommand, WhoamiCommand,
};
use gitmark::config::Config;
use gitmark_core::SyncEngine;

#[derive(Parser)]
#[command(name = "gitmark")]
#[command(version)]
#[command(about = "Edit Markdown files from your GitHub repositories", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a GitHub access token
    Login(LoginCommand),

    /// Show the logged-in user
    Whoami(WhoamiCommand),

    /// List your repositories
    Repos(ReposCommand),

    /// List Markdown files in a repository
    Files(FilesCommand),

    /// Print a file
    Show(ShowCommand),

    /// Save a local draft of a file
    Save(SaveCommand),

    /// Push a file to GitHub
    Push(PushCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    // Logging is opt-in for the CLI
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        Some(command) => {
            let engine = gitmark::build_engine(&config).await?;
            run_command(command, &engine, &config).await?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

async fn run_command(
    command: Commands,
    engine: &SyncEngine,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Login(cmd) => cmd.run(engine, config).await?,
        Commands::Whoami(cmd) => cmd.run(engine, config).await?,
        Commands::Repos(cmd) => cmd.run(engine, config).await?,
        Commands::Files(cmd) => cmd.run(engine, config).await?,
        Commands::Show(cmd) => cmd.run(engine, config).await?,
        Commands::Save(cmd) => cmd.run(engine, config).await?,
        Commands::Push(cmd) => cmd.run(engine, config).await?,
        Commands::Config(cmd) => cmd.run(config)?,
    }
    Ok(())
}

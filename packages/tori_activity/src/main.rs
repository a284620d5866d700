use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use tori_activity::ChannelNames;
use tori_activity::cli::simulate;
use tori_activity::config::{ActivityFileConfig, SimulateConfig, load_config};

#[derive(Parser)]
#[command(name = "tori-activity")]
#[command(about = "Forum presence notifications: typing and posting activity between sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML). TORI_* env vars override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run many in-process sessions against one registry and print metrics
    Simulate(SimulateArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
struct SimulateArgs {
    /// Number of sessions
    #[arg(long)]
    sessions: Option<usize>,
    /// Number of forum threads activity is spread over
    #[arg(long)]
    threads: Option<usize>,
    /// Number of send rounds
    #[arg(long)]
    rounds: Option<usize>,
    /// Sessions invalidated before the first round
    #[arg(long)]
    dead_sessions: Option<usize>,
    /// Channel-name prefix
    #[arg(long)]
    namespace: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config: ActivityFileConfig = load_config(cli.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;

    // Setup logging
    let default_directive = if cli.debug {
        "tori_activity=debug,activity_bus=debug,info".to_string()
    } else {
        file_config.log.filter.clone()
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    match cli.command {
        Commands::Simulate(args) => run_simulate(args, file_config).await,
        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&file_config).context("Failed to render configuration")?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

async fn run_simulate(args: SimulateArgs, mut file_config: ActivityFileConfig) -> Result<()> {
    let sim = &mut file_config.simulate;
    if let Some(v) = args.sessions {
        sim.sessions = v;
    }
    if let Some(v) = args.threads {
        sim.threads = v;
    }
    if let Some(v) = args.rounds {
        sim.rounds = v;
    }
    if let Some(v) = args.dead_sessions {
        sim.dead_sessions = v;
    }
    if args.namespace.is_some() {
        file_config.channels.namespace = args.namespace;
    }

    let config = SimulateConfig::from_file(&file_config.simulate);
    let names = ChannelNames::from_file(&file_config.channels);
    info!(
        "Starting simulation on channels {} and {}",
        names.user_typing, names.user_authored
    );

    let report = simulate(&config, names).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

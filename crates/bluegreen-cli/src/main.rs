use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use bluegreen_core::DeploymentStrategy;

mod commands;

#[derive(Parser)]
#[command(
    name = "bluegreen",
    about = "Blue/green deployment orchestrator",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter bluegreen.toml
    Init {
        /// Application name
        #[arg(short, long)]
        application: String,
        #[arg(short, long, value_enum, default_value = "alias-swap")]
        strategy: StrategyArg,
        #[arg(short, long, default_value = "bluegreen.toml")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Deploy and promote against the sandbox platform
    Run {
        #[arg(short, long, default_value = "bluegreen.toml")]
        config: PathBuf,
        /// Sandbox state file
        #[arg(short, long, default_value = "sandbox.redb")]
        state: PathBuf,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show which environment is production and which is staging
    Status {
        #[arg(short, long, default_value = "bluegreen.toml")]
        config: PathBuf,
        #[arg(short, long, default_value = "sandbox.redb")]
        state: PathBuf,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Manage the sandbox platform
    Sandbox {
        #[command(subcommand)]
        action: SandboxAction,
    },
}

#[derive(Subcommand)]
enum SandboxAction {
    /// Load pre-existing resources from a JSON seed file
    Seed {
        #[arg(short, long, default_value = "sandbox.redb")]
        state: PathBuf,
        #[arg(long)]
        seed: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    AliasSwap,
    SharedRoutingTable,
}

impl From<StrategyArg> for DeploymentStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::AliasSwap => DeploymentStrategy::AliasSwap,
            StrategyArg::SharedRoutingTable => DeploymentStrategy::SharedRoutingTable,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Init {
            application,
            strategy,
            output,
            force,
        } => commands::init::init(&application, strategy.into(), &output, force),
        Commands::Run {
            config,
            state,
            format,
        } => commands::run::run(&config, &state, format).await,
        Commands::Status {
            config,
            state,
            format,
        } => commands::status::status(&config, &state, format).await,
        Commands::Sandbox { action } => match action {
            SandboxAction::Seed { state, seed } => commands::sandbox::seed(&state, &seed),
        },
    }
}

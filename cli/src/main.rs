mod config;
mod launcher;
mod ui;

use clap::{Parser, Subcommand, ValueEnum};
use strum::{Display, EnumString};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "quantgate")]
#[command(about = ui::build_banner())]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available services
    List,

    /// Show version
    Version,

    /// Run a platform service
    Run {
        /// Service to run
        #[arg(short, long)]
        service: ServiceType,

        /// Path to config.toml file
        #[arg(short, long, default_value = "config.toml")]
        config: std::path::PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, EnumString, Display, ValueEnum)]
pub enum ServiceType {
    /// Client-facing WebSocket API gateway
    #[value(name = "gateway")]
    Gateway,
    /// Upstream exchange adapter
    #[value(name = "exchange")]
    Exchange,
    /// Strategy signal worker
    #[value(name = "signal")]
    Signal,
}

#[tools::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.commands {
        Commands::Version => ui::print_version(),
        Commands::List => ui::print_services(),
        Commands::Run { service, config } => {
            launcher::start(service, config).await?;
        }
    }

    Ok(())
}

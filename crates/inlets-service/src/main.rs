use anyhow::Context;
use clap::{Parser, Subcommand};
use inlets_service::logging::init_logging;
use inlets_service::{DEFAULT_EXECUTABLE, ServiceBridge, ServiceConfig, ServiceMode};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "inlets-service", version, about = "Run the inlets-pro client as a service")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tunnel client executable to supervise
    #[arg(long, global = true, default_value = DEFAULT_EXECUTABLE)]
    executable: String,

    /// Service name used for registration and event logging
    #[arg(long, global = true, default_value = "inlets")]
    name: String,

    /// Write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run in the foreground; Ctrl-C stops, stdin lines send controls
    Debug,
    /// Run under the platform service manager
    Run,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(&cli.name, cli.log_dir.as_deref());

    let mode = match cli.command {
        Command::Debug => ServiceMode::Debug,
        Command::Run => ServiceMode::Managed,
    };
    let config = cli.config.unwrap_or_else(ServiceConfig::default_path);

    ServiceBridge::new(cli.name.clone())
        .with_config_path(&config)
        .with_executable(cli.executable)
        .run(mode)
        .with_context(|| format!("{} service failed ({})", cli.name, config.display()))
}

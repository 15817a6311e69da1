use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "firmlink", about = "Console for JavaScript-programmable firmware")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a raw RPC call to the device
    Call(commands::call::CallArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Run a JavaScript snippet on the device
    Exec(commands::exec::ExecArgs),
    /// Tail device logs
    Logs(commands::logs::LogsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Call(args) => commands::call::run(args).await,
        Commands::Config(args) => commands::config::run(args),
        Commands::Exec(args) => commands::exec::run(args).await,
        Commands::Logs(args) => commands::logs::run(args).await,
    }
}

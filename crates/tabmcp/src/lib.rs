pub mod commands;
pub mod utils;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::commands::{init::InitCmd, start::StartCmd, status::StatusCmd};
use tabmcp_config::Config;

#[derive(Parser)]
#[command(name = "tabmcp")]
#[command(version)]
#[command(about = "tabmcp - browser tools over MCP")]
#[command(
    long_about = "tabmcp runs a local bridge that aggregates tools registered by browser tabs \
and exposes them to AI agents as a single MCP endpoint."
)]
#[command(after_help = "EXAMPLES:\n  \
    tabmcp init \n  \
    tabmcp start \n  \
    tabmcp status \n\
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path, defaults to ./tabmcp.json
    #[arg(long, short = 'c', global = true, default_value_t = Config::default_path())]
    pub config: Utf8PathBuf,

    /// No logging except for errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Verbose logging (-v) or trace logging (-vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    #[allow(clippy::missing_errors_doc)]
    pub async fn handle(&self) -> anyhow::Result<()> {
        match &self.command {
            Commands::Init(cmd) => cmd.handle(&self.config)?,
            Commands::Start(cmd) => cmd.handle(Config::load(&self.config)?).await?,
            Commands::Status(cmd) => cmd.handle(Config::load(&self.config)?).await?,
        }

        Ok(())
    }
}

#[derive(Debug, Subcommand)]
#[command(styles=utils::styles::get_styles())]
pub enum Commands {
    /// Start the bridge server
    #[command(long_about = "Start the bridge (exposes /mcp for agents, /session and /ws for the \
browser extension).")]
    Start(StartCmd),

    /// Report whether a bridge is running and what it advertises
    #[command(long_about = "Probe the discovery files and the running bridge, and print its \
current state.")]
    Status(StatusCmd),

    /// Initialize configuration file
    #[command(long_about = "Initialize tabmcp.json configuration file.")]
    Init(InitCmd),
}

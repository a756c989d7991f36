use anyhow::Result;
use clap::Parser;
use log::info;
use tabmcp_bridge::Bridge;
use tabmcp_config::Config;

use crate::utils::styles::{fmt_bold, fmt_cyan};

#[derive(Debug, Clone, Parser)]
pub struct StartCmd {
    /// Host address to bind to (loopback only)
    #[arg(long)]
    pub host: Option<String>,

    /// Pin a single port instead of probing the configured range
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl StartCmd {
    pub(crate) async fn handle(&self, mut cfg: Config) -> Result<()> {
        if let Some(host) = &self.host {
            cfg.host.clone_from(host);
        }
        if let Some(port) = self.port {
            cfg.port_range = (port, port);
        }

        info!(
            "Starting {} on {}",
            fmt_bold("tabmcp"),
            fmt_cyan(&format!("{}:{}-{}", cfg.host, cfg.port_range.0, cfg.port_range.1))
        );

        Bridge::serve(&cfg).await?;

        info!("Shutting down...");
        Ok(())
    }
}

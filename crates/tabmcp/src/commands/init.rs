use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use tabmcp_config::Config;

use crate::utils::styles::{fmt_bold, fmt_dimmed, fmt_success};

#[derive(Debug, Clone, Parser)]
pub struct InitCmd {
    /// Overwrite an existing config file
    #[arg(long, short)]
    pub force: bool,
}

impl InitCmd {
    pub(crate) fn handle(&self, path: &Utf8PathBuf) -> Result<()> {
        if path.exists() && !self.force {
            anyhow::bail!(
                "A tabmcp config already exists at {path}, pass {} to overwrite it",
                fmt_bold("--force")
            );
        }

        let cfg = Config::default().with_path(path);
        cfg.save()?;

        info!(
            "{}",
            fmt_success(&format!(
                "{name} configuration created: {path}",
                name = fmt_bold("tabmcp"),
                path = fmt_dimmed(cfg.path().as_str()),
            ))
        );

        Ok(())
    }
}

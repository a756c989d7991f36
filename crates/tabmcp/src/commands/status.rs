use std::fmt::Display;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::info;
use tabmcp_config::{Config, discovery};

use crate::utils::styles::{fmt_bold, fmt_cyan, fmt_dimmed, fmt_error, fmt_success};

#[derive(Debug, Clone, Parser)]
pub struct StatusCmd;

impl StatusCmd {
    pub(crate) async fn handle(&self, cfg: Config) -> Result<()> {
        let summary = BridgeSummary::probe(&cfg).await;
        info!("\n{summary}");
        Ok(())
    }
}

struct BridgeSummary {
    discovered_port: Option<u16>,
    live_port: Option<u16>,
    mcp_url: Option<String>,
    error: Option<String>,
}

impl BridgeSummary {
    async fn probe(cfg: &Config) -> Self {
        let http = reqwest::Client::new();
        let url_host = cfg.url_host();
        let discovered = discovery::read(&cfg.discovery_dir);
        let discovered_port = discovered.as_ref().map(|d| d.port);

        // Prefer the discovery files, fall back to scanning the range. A
        // stale discovery file from a crashed bridge must not count as
        // running.
        let mut candidates: Vec<u16> = discovered_port.into_iter().collect();
        candidates.extend(cfg.port_range.0..=cfg.port_range.1);

        let mut live_port = None;
        for port in candidates {
            let url = format!("http://{url_host}:{port}/session");
            let reachable = http
                .get(&url)
                .timeout(Duration::from_millis(250))
                .send()
                .await
                .is_ok_and(|r| r.status().is_success());
            if reachable {
                live_port = Some(port);
                break;
            }
        }

        let error = match (discovered_port, live_port) {
            (_, Some(_)) => None,
            (Some(port), None) => Some(format!(
                "discovery files point at port {port} but nothing answered (stale?)"
            )),
            (None, None) => Some(format!(
                "no bridge found on ports {}-{}",
                cfg.port_range.0, cfg.port_range.1
            )),
        };

        Self {
            discovered_port,
            live_port,
            mcp_url: live_port.map(|p| format!("http://{url_host}:{p}/mcp")),
            error,
        }
    }
}

impl Display for BridgeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields = vec![];

        if let Some(e) = &self.error {
            fields.push(fmt_error(e));
        } else {
            fields.push(fmt_success("Running"));
        }

        let discovered = self
            .discovered_port
            .map_or(fmt_dimmed("none"), |p| p.to_string());
        fields.push(format!("{}: {discovered}", fmt_bold("Discovery port")));

        if let Some(port) = self.live_port {
            fields.push(format!("{}: {port}", fmt_bold("Live port")));
        }
        if let Some(url) = &self.mcp_url {
            fields.push(format!("{}: {url}", fmt_bold("MCP endpoint")));
        }

        let tree = fields
            .iter()
            .enumerate()
            .map(|(i, field)| {
                if i < fields.len() - 1 {
                    format!("├── {field}")
                } else {
                    format!("└── {field}")
                }
            })
            .collect::<Vec<String>>()
            .join("\n");

        write!(f, "{}\n{tree}", fmt_cyan("tabmcp bridge"))
    }
}

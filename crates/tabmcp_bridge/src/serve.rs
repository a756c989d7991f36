//! Server entry point: binds the loopback listener, mounts the
//! extension-facing routes and the MCP endpoint, and writes the discovery
//! files for the lifetime of the process.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::transport::{
    StreamableHttpServerConfig,
    streamable_http_server::{StreamableHttpService, session::local::LocalSessionManager},
};
use tabmcp_config::{Config, discovery};
use tokio::net::TcpListener;

use crate::adapter::{self, BridgeTools};
use crate::auth;
use crate::state::{BridgeState, BridgeTiming};
use crate::transport;

pub struct Bridge;

impl Bridge {
    /// Runs the bridge until ctrl-c.
    ///
    /// # Errors
    ///
    /// Returns an error when config validation fails, no port in the
    /// configured range is free, or the listener dies.
    pub async fn serve(cfg: &Config) -> Result<()> {
        cfg.validate()?;

        let token = auth::generate_session_token();
        let state = Arc::new(BridgeState::new(token.clone(), BridgeTiming::from(cfg)));
        let peers = adapter::install_change_notifier(&state);

        let mcp_state = Arc::clone(&state);
        let service = StreamableHttpService::new(
            move || {
                Ok(BridgeTools::new(
                    Arc::clone(&mcp_state),
                    Arc::clone(&peers),
                ))
            },
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                // Sessions stay open so list_changed notifications reach
                // connected MCP clients.
                stateful_mode: true,
                ..Default::default()
            },
        );

        let router = transport::extension_routes(Arc::clone(&state)).nest_service("/mcp", service);

        let (listener, port) = Self::bind_in_range(cfg).await?;
        discovery::write(&cfg.discovery_dir, port, &token)
            .context("Failed to write discovery files")?;

        log::info!("tabmcp bridge listening at http://{}:{port}", cfg.url_host());
        log::info!("  MCP endpoint:   /mcp");
        log::info!("  extension auth: /session + /ws");

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                tokio::signal::ctrl_c()
                    .await
                    .expect("failed graceful shutdown");
                log::info!("shutting down");
            })
            .await;

        discovery::remove(&cfg.discovery_dir);
        result.context("bridge server failed")
    }

    /// Binds the first free port in the configured range.
    async fn bind_in_range(cfg: &Config) -> Result<(TcpListener, u16)> {
        let (start, end) = cfg.port_range;
        for port in start..=end {
            match TcpListener::bind((cfg.host.as_str(), port)).await {
                Ok(listener) => return Ok((listener, port)),
                Err(e) => log::debug!("port {port} unavailable: {e}"),
            }
        }
        anyhow::bail!("no free port in range {start}-{end}")
    }
}

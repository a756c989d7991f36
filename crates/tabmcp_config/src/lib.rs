pub mod discovery;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

/// First port the bridge tries when binding its loopback listener.
pub const PORT_RANGE_START: u16 = 13100;
/// Last port in the probe range, inclusive.
pub const PORT_RANGE_END: u16 = 13199;

/// Bridge configuration, loaded from `tabmcp.json`.
///
/// Every field has a serde default so a partial (or absent) config file is
/// always usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind address for the loopback listener. Anything other than a
    /// loopback address is rejected at startup.
    pub host: String,
    /// Inclusive port range probed for a free port.
    pub port_range: (u16, u16),
    /// Deadline for a routed tool call, in milliseconds.
    pub call_timeout_ms: u64,
    /// How long a call dispatched with no extension connection waits for a
    /// reconnect before failing.
    pub grace_window_ms: u64,
    /// Server-initiated heartbeat interval on the extension socket.
    pub heartbeat_interval_ms: u64,
    /// Quiet period before a `tools/list_changed` notification fires.
    pub notify_debounce_ms: u64,
    /// Quiet period before the context snapshot is written to disk.
    pub persist_debounce_ms: u64,
    /// Session-scoped snapshot of the per-context tool map.
    pub snapshot_path: Utf8PathBuf,
    /// Directory holding the `port`/`token` discovery files.
    pub discovery_dir: Utf8PathBuf,

    #[serde(skip)]
    path: Utf8PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port_range: (PORT_RANGE_START, PORT_RANGE_END),
            call_timeout_ms: 30_000,
            grace_window_ms: 5_000,
            heartbeat_interval_ms: 15_000,
            notify_debounce_ms: 300,
            persist_debounce_ms: 500,
            snapshot_path: Utf8PathBuf::from(".tabmcp/contexts.json"),
            discovery_dir: Utf8PathBuf::from(".tabmcp/discovery"),
            path: Self::default_path(),
        }
    }
}

impl Config {
    pub fn default_path() -> Utf8PathBuf {
        Utf8PathBuf::from("./tabmcp.json")
    }

    #[must_use]
    pub fn with_path(mut self, path: &Utf8Path) -> Self {
        self.path = path.to_owned();
        self
    }

    /// Loads the config from `path`, falling back to defaults when the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default().with_path(path));
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        let cfg: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {path}"))?;
        Ok(cfg.with_path(path))
    }

    /// Writes the config back to its path as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be written.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write config file {}", self.path))?;
        Ok(())
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Host formatted for use inside a URL: IPv6 literals are bracketed,
    /// everything else passes through.
    pub fn url_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    /// Validates loopback-only binding.
    ///
    /// # Errors
    ///
    /// Returns an error for any non-loopback host.
    pub fn validate(&self) -> Result<()> {
        if self.host != "127.0.0.1" && self.host != "localhost" && self.host != "::1" {
            anyhow::bail!("tabmcp only binds loopback addresses, got '{}'", self.host);
        }
        if self.port_range.0 > self.port_range.1 {
            anyhow::bail!(
                "invalid port range {}-{}",
                self.port_range.0,
                self.port_range.1
            );
        }
        Ok(())
    }
}

//! Discovery file pair written by a running bridge.
//!
//! Local MCP clients that do not want to probe the port range can read the
//! `port` and `token` files instead. The directory is owner-only and both
//! files are owner read/write; everything is removed on graceful shutdown.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;

/// Port/token pair read back from a discovery directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub port: u16,
    pub token: String,
}

/// Writes the discovery pair, tightening permissions on unix.
///
/// # Errors
///
/// Returns an error if the directory or either file cannot be written.
pub fn write(dir: &Utf8Path, port: u16, token: &str) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create discovery dir {dir}"))?;
    restrict(dir.as_std_path(), 0o700)?;

    let port_path = dir.join("port");
    fs::write(&port_path, port.to_string())
        .with_context(|| format!("Failed to write {port_path}"))?;
    restrict(port_path.as_std_path(), 0o600)?;

    let token_path = dir.join("token");
    fs::write(&token_path, token).with_context(|| format!("Failed to write {token_path}"))?;
    restrict(token_path.as_std_path(), 0o600)?;

    Ok(())
}

/// Reads the discovery pair back, if present and well-formed.
pub fn read(dir: &Utf8Path) -> Option<Discovery> {
    let port = fs::read_to_string(dir.join("port"))
        .ok()?
        .trim()
        .parse()
        .ok()?;
    let token = fs::read_to_string(dir.join("token")).ok()?.trim().to_string();
    if token.is_empty() {
        return None;
    }
    Some(Discovery { port, token })
}

/// Removes the discovery files and their directory. Missing files are fine.
pub fn remove(dir: &Utf8Path) {
    for name in ["port", "token"] {
        let path = dir.join(name);
        if let Err(e) = fs::remove_file(&path)
            && path.exists()
        {
            log::warn!("Failed to remove discovery file {path}: {e}");
        }
    }
    let _ = fs::remove_dir(dir);
}

#[cfg(unix)]
fn restrict(path: &std::path::Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict(_path: &std::path::Path, _mode: u32) -> Result<()> {
    Ok(())
}

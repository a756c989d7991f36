//! Session token and nonce generation, plus the origin allowlist.

use rand::RngCore;

/// Scheme the privileged extension runtime presents in its `Origin` header.
pub const EXTENSION_SCHEME: &str = "chrome-extension://";

/// Generates the process-lifetime session token: 32 random bytes, hex
/// encoded (256 bits of entropy).
pub fn generate_session_token() -> String {
    random_hex(32)
}

/// Generates a per-page-load nonce from the same randomness source.
pub fn generate_nonce() -> String {
    random_hex(16)
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    let mut out = String::with_capacity(bytes * 2);
    for b in buf {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Strict allowlist for the bootstrap endpoint.
///
/// An absent origin is accepted (extension-runtime-initiated requests omit
/// the header), as is the extension's own scheme. Every web scheme and any
/// unknown scheme is rejected.
pub fn validate_origin(origin: Option<&str>) -> bool {
    match origin {
        None => true,
        Some(o) => o.starts_with(EXTENSION_SCHEME),
    }
}

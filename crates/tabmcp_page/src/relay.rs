//! Forwarding across the page execution boundary.
//!
//! The relay interprets nothing: it verifies origin and nonce, then passes
//! payloads through. The nonce is a capability token proving "this message
//! originated from code running in this specific page load"; the boundary
//! itself already separates privilege levels.

use tokio::sync::mpsc;

use crate::messages::{Framed, PageCommand, PageEvent};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("message origin '{0}' does not match page origin")]
    BadOrigin(String),
    #[error("message nonce mismatch")]
    BadNonce,
    #[error("boundary channel closed")]
    Closed,
}

/// Per-page-load relay between the page execution world and the privileged
/// runtime.
pub struct IsolationRelay {
    origin: String,
    nonce: String,
    to_host: mpsc::UnboundedSender<PageEvent>,
    to_page: mpsc::UnboundedSender<Framed<PageCommand>>,
}

impl IsolationRelay {
    pub fn new(
        origin: impl Into<String>,
        nonce: impl Into<String>,
        to_host: mpsc::UnboundedSender<PageEvent>,
        to_page: mpsc::UnboundedSender<Framed<PageCommand>>,
    ) -> Self {
        Self {
            origin: origin.into(),
            nonce: nonce.into(),
            to_host,
            to_page,
        }
    }

    /// Forwards a page event to the privileged runtime, stripping the nonce
    /// (the runtime is already trusted).
    ///
    /// # Errors
    ///
    /// Rejects messages whose origin or nonce does not match this page
    /// load; this is the sole defense against a malicious page script
    /// injecting forged protocol frames.
    pub fn relay_to_host(&self, framed: Framed<PageEvent>) -> Result<(), RelayError> {
        self.verify(&framed.origin, &framed.nonce)?;
        self.to_host
            .send(framed.payload)
            .map_err(|_| RelayError::Closed)
    }

    /// Forwards a privileged-runtime command into the page, re-tagged with
    /// the page's nonce.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Closed`] when the page side is gone.
    pub fn relay_to_page(&self, command: PageCommand) -> Result<(), RelayError> {
        self.to_page
            .send(Framed {
                origin: self.origin.clone(),
                nonce: self.nonce.clone(),
                payload: command,
            })
            .map_err(|_| RelayError::Closed)
    }

    fn verify(&self, origin: &str, nonce: &str) -> Result<(), RelayError> {
        if origin != self.origin {
            return Err(RelayError::BadOrigin(origin.to_string()));
        }
        if nonce != self.nonce {
            return Err(RelayError::BadNonce);
        }
        Ok(())
    }
}

//! Reconnecting WebSocket client for the bridge process.
//!
//! Discovery probes the bootstrap endpoint across the port range, then the
//! client authenticates the upgrade with the returned token. Connection
//! loss feeds a bounded exponential backoff and the loop starts over.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use tabmcp_bridge::wire::{self, WireMessage};

use crate::runtime::HostEvent;

/// Bounded retry policy: base delay, multiplier, cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub multiplier: u32,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            multiplier: 2,
            cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before reconnect attempt `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.min(16));
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Keeps one authenticated connection to the bridge alive.
pub struct BridgeClient {
    host: String,
    port_range: (u16, u16),
    policy: RetryPolicy,
}

impl BridgeClient {
    pub fn new(cfg: &tabmcp_config::Config, policy: RetryPolicy) -> Self {
        Self {
            // Bracketed when the host is an IPv6 literal; this string only
            // ever lands inside URLs.
            host: cfg.url_host(),
            port_range: cfg.port_range,
            policy,
        }
    }

    /// Runs forever: discover, connect, pump, back off, repeat. Returns
    /// when the event channel closes.
    pub async fn run(
        self,
        events: mpsc::UnboundedSender<HostEvent>,
        mut outbound: mpsc::UnboundedReceiver<WireMessage>,
    ) {
        let http = reqwest::Client::new();
        let mut attempt: u32 = 0;

        loop {
            if let Some((port, token)) = self.discover(&http).await {
                let url = format!("ws://{}:{port}/ws?token={token}", self.host);
                match connect_async(&url).await {
                    Ok((socket, _response)) => {
                        log::info!("connected to bridge on port {port}");
                        attempt = 0;
                        // Frames queued while disconnected are stale; the
                        // register_tools re-sync on connect supersedes them.
                        while outbound.try_recv().is_ok() {}
                        if events.send(HostEvent::BridgeConnected).is_err() {
                            return;
                        }
                        Self::pump(socket, &events, &mut outbound).await;
                        let _ = events.send(HostEvent::BridgeDisconnected);
                        log::warn!("bridge connection lost");
                    }
                    Err(e) => log::debug!("websocket connect failed: {e}"),
                }
            } else {
                log::debug!(
                    "no bridge found on ports {}-{}",
                    self.port_range.0,
                    self.port_range.1
                );
            }

            if events.is_closed() {
                return;
            }
            let delay = self.policy.delay(attempt);
            attempt = attempt.saturating_add(1);
            tokio::time::sleep(delay).await;
        }
    }

    /// Probes the bootstrap endpoint across the port range.
    async fn discover(&self, http: &reqwest::Client) -> Option<(u16, String)> {
        for port in self.port_range.0..=self.port_range.1 {
            let url = format!("http://{}:{port}/session", self.host);
            let Ok(response) = http
                .get(&url)
                .timeout(Duration::from_millis(250))
                .send()
                .await
            else {
                continue;
            };
            if !response.status().is_success() {
                continue;
            }
            if let Ok(body) = response.json::<serde_json::Value>().await
                && let Some(token) = body.get("token").and_then(|t| t.as_str())
            {
                return Some((port, token.to_string()));
            }
        }
        None
    }

    async fn pump(
        socket: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        events: &mpsc::UnboundedSender<HostEvent>,
        outbound: &mut mpsc::UnboundedReceiver<WireMessage>,
    ) {
        let (mut sink, mut stream) = socket.split();
        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    let Ok(text) = wire::encode_frame(&frame) else { continue };
                    if sink.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                inbound = stream.next() => {
                    let Some(Ok(message)) = inbound else { break };
                    match message {
                        Message::Text(text) => {
                            if let Some(frame) = wire::parse_frame(text.as_str())
                                && events.send(HostEvent::Bridge(frame)).is_err()
                            {
                                break;
                            }
                        }
                        Message::Ping(payload) => {
                            if sink.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            base: Duration::from_millis(100),
            multiplier: 2,
            cap: Duration::from_secs(5),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
        assert_eq!(policy.delay(10), Duration::from_secs(5));
        // Large attempt counts must not overflow.
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_default_policy_starts_small() {
        let policy = RetryPolicy::default();
        assert!(policy.delay(0) <= Duration::from_secs(1));
        assert_eq!(policy.delay(30), policy.cap);
    }
}

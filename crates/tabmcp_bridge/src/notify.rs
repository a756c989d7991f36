//! Trailing-edge debouncer for change notifications.
//!
//! A burst of pokes collapses into a single `on_settle` call fired after a
//! quiet period, so consumers re-query once per settled state instead of
//! once per intermediate mutation.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

#[derive(Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    /// Spawns the debounce task. `on_settle` runs once per settled burst.
    pub fn spawn<F, Fut>(window: Duration, mut on_settle: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Quiet period restarts on every further poke.
                loop {
                    match tokio::time::timeout(window, rx.recv()).await {
                        Ok(Some(())) => {}
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }
                on_settle().await;
            }
        });
        Self { tx }
    }

    /// Records a mutation. Cheap and non-blocking.
    pub fn poke(&self) {
        let _ = self.tx.send(());
    }
}

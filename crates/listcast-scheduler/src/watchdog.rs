//! Per-job deadline timer.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Single-shot timer that runs a callback unless disarmed first.
#[derive(Debug, Clone, Default)]
pub struct Watchdog {
    token: CancellationToken,
}

impl Watchdog {
    /// Start a timer that runs `on_fire` after `timeout`.
    pub fn arm<F, Fut>(timeout: Duration, on_fire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = child.cancelled() => {
                    debug!("Watchdog disarmed");
                }
                _ = tokio::time::sleep(timeout) => {
                    debug!(timeout_ms = timeout.as_millis() as u64, "Watchdog fired");
                    on_fire().await;
                }
            }
        });

        Self { token }
    }

    /// Stop the timer. Calling this more than once, or after it fired, does nothing.
    pub fn disarm(&self) {
        self.token.cancel();
    }

    pub fn is_disarmed(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Arc<AtomicUsize>, impl FnOnce() -> std::future::Ready<()> + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let on_fire = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        };
        (fired, on_fire)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_timeout() {
        let (fired, on_fire) = counting();
        let _watchdog = Watchdog::arm(Duration::from_secs(5), on_fire);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_prevents_firing() {
        let (fired, on_fire) = counting();
        let watchdog = Watchdog::arm(Duration::from_secs(5), on_fire);

        watchdog.disarm();
        watchdog.disarm();
        assert!(watchdog.is_disarmed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_after_fire_is_harmless() {
        let (fired, on_fire) = counting();
        let watchdog = Watchdog::arm(Duration::from_millis(10), on_fire);

        tokio::time::sleep(Duration::from_millis(50)).await;
        watchdog.disarm();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}

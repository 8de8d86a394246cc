//! Clock backed by the tokio timer.

use std::time::Duration;

use cadence_core::{BoxFuture, Clock};

/// Sleeps on `tokio::time`, so a paused runtime advances it virtually.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleeps_on_virtual_time() {
        let start = tokio::time::Instant::now();
        TokioClock.sleep(Duration::from_secs(90)).await;
        assert!(start.elapsed() >= Duration::from_secs(90));
    }
}

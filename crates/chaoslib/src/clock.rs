use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Trait for sources of monotonic time.
pub trait Clock {
    /// Time elapsed since some fixed, clock-specific origin.
    fn now(&self) -> Duration;

    /// Wait for `duration` to pass.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// The real clock, backed by the tokio timer.
#[derive(Clone, Debug)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

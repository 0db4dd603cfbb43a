//! Time source for settle delays and polling

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tfplug::context::Context;

#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested sleep
#[derive(Debug, Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Total simulated time slept
    pub fn elapsed(&self) -> Duration {
        self.sleeps().iter().sum()
    }

    pub fn reset(&self) {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl Clock for RecordingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Sleeps for `duration` unless `ctx` is cancelled first
pub async fn sleep_or_cancel(
    clock: &dyn Clock,
    ctx: &Context,
    duration: Duration,
) -> Result<(), Cancelled> {
    if ctx.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(Cancelled),
        _ = clock.sleep(duration) => Ok(()),
    }
}

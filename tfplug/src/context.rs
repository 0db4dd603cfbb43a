//! Request-scoped cancellation
//!
//! Every lifecycle call receives a [`Context`]. Long-running provider work
//! (sleeps, polls) races [`Context::cancelled`] so the host can stop an
//! operation early.

use std::sync::Arc;
use tokio::sync::watch;

/// Context carries the cancellation signal for a single lifecycle operation
/// CRITICAL: Pass this as first parameter to ALL async trait methods
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    done_tx: watch::Sender<bool>,
    done: watch::Receiver<bool>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, done) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner { done_tx, done }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.done.borrow()
    }

    pub fn cancel(&self) {
        let _ = self.inner.done_tx.send(true);
    }

    /// Resolves once the context is cancelled. Never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut done = self.inner.done.clone();
        if *done.borrow_and_update() {
            return;
        }
        while done.changed().await.is_ok() {
            if *done.borrow_and_update() {
                return;
            }
        }
        // The sender lives as long as `inner`, so this is only reachable if
        // the channel is torn down while we hold a clone of it.
        std::future::pending::<()>().await
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

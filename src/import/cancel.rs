//! Stop signal shared by the CLI, the pipeline and the importer
//!
//! Blocking code polls [`CancellationToken::is_cancelled`] (the importer,
//! between levels); async code can await [`CancellationToken::cancelled`]
//! to abandon a knowledge-base phase early. Committed levels stay committed.

use std::sync::Arc;
use tokio::sync::watch;

/// Set once, observed by every clone.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag: Arc::new(flag) }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Idempotent; wakes every task parked in `cancelled`.
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    /// Resolves once `cancel` has been called, immediately if it already was.
    pub async fn cancelled(&self) {
        let mut seen = self.flag.subscribe();
        // the sender lives in `self`, so the channel cannot close while we wait
        let _ = seen.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

//! Frame deadline shared by the update batchers.
//!
//! A batcher arms the timer when its first pending update arrives and flushes
//! when the deadline passes. While armed, further updates join the same batch.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

#[derive(Debug)]
pub(crate) struct FrameTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl FrameTimer {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Schedule the next frame unless one is already pending.
    pub(crate) fn arm(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.interval);
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.deadline = None;
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Resolve at `deadline`, or never when no frame is scheduled.
pub(crate) async fn next_frame(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

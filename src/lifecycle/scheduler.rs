//! Periodic window resets.
//!
//! Three independent timers, one per [`Window`], each resetting that window
//! on every leg of every registered pair. Pairs created between ticks join
//! the next reset.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::pairing::{PairRegistry, Window};

/// Drives 1m / 5m / 30m resets over a [`PairRegistry`].
#[derive(Debug, Clone)]
pub struct WindowResetScheduler {
    pairs: Arc<PairRegistry>,
}

impl WindowResetScheduler {
    pub fn new(pairs: Arc<PairRegistry>) -> Self {
        Self { pairs }
    }

    /// Reset `window` across all pairs now.
    pub fn reset(&self, window: Window) {
        self.pairs.reset_all_windows(window);
        tracing::debug!(window = %window, pairs = self.pairs.count_pairs(), "Window reset");
    }

    /// Run until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let start = Instant::now();
        let [mut one, mut five, mut thirty] = Window::ALL.map(|window| {
            let mut ticker = interval_at(start + window.period(), window.period());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = one.tick() => self.reset(Window::OneMinute),
                _ = five.tick() => self.reset(Window::FiveMinutes),
                _ = thirty.tick() => self.reset(Window::ThirtyMinutes),
                _ = shutdown.recv() => {
                    tracing::debug!("Window reset scheduler stopped");
                    break;
                }
            }
        }
    }
}

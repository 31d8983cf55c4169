//! Pacing and human-like interaction between feed rounds.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::browser::PageDriver;

/// Inclusive millisecond range for randomised pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn secs(min: u64, max: u64) -> Self {
        Self {
            min_ms: min * 1000,
            max_ms: max * 1000,
        }
    }

    pub const fn millis(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Pick a duration within the range (a reversed range collapses to `min_ms`).
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }
}

/// Source of every delay in the harvester.
///
/// Production uses [`TokioPacer`]; tests record the requested delays instead
/// of waiting.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn sleep(&self, duration: Duration);

    /// Sleep for a random duration within `range`.
    async fn pause(&self, range: DelayRange) {
        self.sleep(range.sample()).await;
    }
}

/// Real-time pacer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Randomised partial scrolls and a synthetic pointer move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Humanizer {
    /// Number of partial scrolls per simulation (inclusive bounds).
    pub scrolls: (u32, u32),
    /// Pixel distance of each partial scroll (inclusive bounds).
    pub scroll_px: (i64, i64),
    /// Pointer coordinates are drawn from `0..=pointer_extent` on both axes.
    pub pointer_extent: i64,
    pub scroll_pause: DelayRange,
}

impl Default for Humanizer {
    fn default() -> Self {
        Self {
            scrolls: (1, 3),
            scroll_px: (100, 300),
            pointer_extent: 1000,
            scroll_pause: DelayRange::secs(1, 2),
        }
    }
}

impl Humanizer {
    /// Run one simulation. Failures are logged and never propagated.
    pub async fn simulate<D, P>(&self, driver: &D, pacer: &P)
    where
        D: PageDriver + ?Sized,
        P: Pacer + ?Sized,
    {
        let (scrolls, offsets, pointer) = {
            let mut rng = rand::rng();
            let scrolls = rng.random_range(self.scrolls.0..=self.scrolls.1.max(self.scrolls.0));
            let (low, high) = self.scroll_px;
            let offsets: Vec<i64> = (0..scrolls)
                .map(|_| rng.random_range(low..=high.max(low)))
                .collect();
            let extent = self.pointer_extent.max(0);
            let pointer = (rng.random_range(0..=extent), rng.random_range(0..=extent));
            (scrolls, offsets, pointer)
        };

        debug!("Simulating {} partial scrolls", scrolls);
        for dy in offsets {
            if let Err(e) = driver.scroll_by(dy).await {
                warn!("Error in human behavior simulation: {}", e);
                return;
            }
            pacer.pause(self.scroll_pause).await;
        }

        if let Err(e) = driver.dispatch_pointer_move(pointer.0, pointer.1).await {
            warn!("Error in human behavior simulation: {}", e);
        }
    }
}

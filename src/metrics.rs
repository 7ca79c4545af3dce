//! Detection statistics
//!
//! A collector the caller owns and shares (typically behind an `Arc`) across
//! requests. Counters are lock-free so recording never contends with grading.

use crate::detection::DetectionMethod;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How one detection request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Found by the on-device strategies, including the full-frame fallback
    Classical,
    /// Found by the vision fallback
    Fallback,
    /// No usable quadrilateral
    NotFound,
}

impl DetectionSource {
    pub fn from_method(method: Option<DetectionMethod>) -> Self {
        match method {
            Some(DetectionMethod::VisionFallback) => DetectionSource::Fallback,
            Some(_) => DetectionSource::Classical,
            None => DetectionSource::NotFound,
        }
    }
}

/// One detection request as recorded by [`DetectionMetrics::record`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOutcome {
    pub source: DetectionSource,
    /// Whether the vision fallback was consulted, successful or not
    pub fallback_attempted: bool,
    pub elapsed: Duration,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total: u64,
    pub classical_successes: u64,
    pub fallback_successes: u64,
    pub fallback_attempts: u64,
    pub failures: u64,
    /// Share of requests that produced a quadrilateral
    pub success_rate: f64,
    pub classical_rate: f64,
    pub fallback_rate: f64,
    pub mean_time_ms: f64,
}

#[derive(Debug, Default)]
pub struct DetectionMetrics {
    total: AtomicU64,
    classical: AtomicU64,
    fallback: AtomicU64,
    fallback_attempts: AtomicU64,
    failures: AtomicU64,
    elapsed_us: AtomicU64,
}

impl DetectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &DetectionOutcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome.source {
            DetectionSource::Classical => &self.classical,
            DetectionSource::Fallback => &self.fallback,
            DetectionSource::NotFound => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if outcome.fallback_attempted {
            self.fallback_attempts.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(outcome.elapsed.as_micros()).unwrap_or(u64::MAX);
        self.elapsed_us.fetch_add(micros, Ordering::Relaxed);
    }

    /// Counters are read individually; a snapshot taken while other threads
    /// record may mix two adjacent states.
    pub fn snapshot(&self) -> DetectionStats {
        let total = self.total.load(Ordering::Relaxed);
        let classical_successes = self.classical.load(Ordering::Relaxed);
        let fallback_successes = self.fallback.load(Ordering::Relaxed);
        let fallback_attempts = self.fallback_attempts.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let elapsed_us = self.elapsed_us.load(Ordering::Relaxed);

        let rate = |n: u64| if total == 0 { 0.0 } else { n as f64 / total as f64 };
        DetectionStats {
            total,
            classical_successes,
            fallback_successes,
            fallback_attempts,
            failures,
            success_rate: rate(classical_successes + fallback_successes),
            classical_rate: rate(classical_successes),
            fallback_rate: rate(fallback_successes),
            mean_time_ms: if total == 0 {
                0.0
            } else {
                elapsed_us as f64 / total as f64 / 1000.0
            },
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total,
            &self.classical,
            &self.fallback,
            &self.fallback_attempts,
            &self.failures,
            &self.elapsed_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

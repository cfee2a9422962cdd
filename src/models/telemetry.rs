use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Availability SLI over a window: good/total event counts plus
/// the derived ratio and error rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySliData {
    pub service_id: String,
    pub good_events: u64,
    pub total_events: u64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub sample_count: u64,
}

impl AvailabilitySliData {
    pub fn new(
        service_id: impl Into<String>,
        good_events: u64,
        total_events: u64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        sample_count: u64,
    ) -> Result<Self, EngineError> {
        if good_events > total_events {
            return Err(EngineError::invalid(format!(
                "good_events ({good_events}) cannot exceed total_events ({total_events})"
            )));
        }
        if window_start >= window_end {
            return Err(EngineError::invalid("window_start must precede window_end"));
        }
        Ok(Self {
            service_id: service_id.into(),
            good_events,
            total_events,
            window_start,
            window_end,
            sample_count,
        })
    }

    /// `good / total`; 1.0 when there were no events at all (vacuously
    /// available).
    pub fn ratio(&self) -> f64 {
        if self.total_events == 0 {
            1.0
        } else {
            self.good_events as f64 / self.total_events as f64
        }
    }

    pub fn error_rate(&self) -> f64 {
        1.0 - self.ratio()
    }
}

/// Latency SLI over a window: the four percentiles must be
/// non-decreasing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencySliData {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p999_ms: f64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub sample_count: u64,
}

impl LatencySliData {
    pub fn new(
        p50_ms: f64,
        p95_ms: f64,
        p99_ms: f64,
        p999_ms: f64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        sample_count: u64,
    ) -> Result<Self, EngineError> {
        if !(p50_ms >= 0.0 && p50_ms <= p95_ms && p95_ms <= p99_ms && p99_ms <= p999_ms) {
            return Err(EngineError::invalid(format!(
                "latency percentiles must satisfy 0 <= p50 <= p95 <= p99 <= p999, got {p50_ms}/{p95_ms}/{p99_ms}/{p999_ms}"
            )));
        }
        if window_start >= window_end {
            return Err(EngineError::invalid("window_start must precede window_end"));
        }
        Ok(Self {
            p50_ms,
            p95_ms,
            p99_ms,
            p999_ms,
            window_start,
            window_end,
            sample_count,
        })
    }
}

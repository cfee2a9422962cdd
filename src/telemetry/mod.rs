//! Telemetry Port (C3): the abstraction the pipeline queries for raw SLI
//! data, independent of the telemetry backend. Two implementations ship:
//! [`mock::SeededMockTelemetryPort`] for development and tests, and
//! [`clickhouse::ClickHouseTelemetryPort`] for production.

pub mod clickhouse;
pub mod mock;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::{AvailabilitySliData, LatencySliData};

/// Queries raw SLI telemetry for a service by its business id. All windows
/// are expressed in whole days, ending now.
#[async_trait]
pub trait TelemetryPort: Send + Sync {
    /// Availability counts over the window, or `None` if the service has no
    /// data at all for that lookback (treated as a cold-start signal, not an
    /// error).
    async fn availability_sli(
        &self,
        service_id: &str,
        window_days: u32,
    ) -> Result<Option<AvailabilitySliData>, EngineError>;

    /// Latency percentiles over the window, or `None` if unavailable.
    async fn latency_sli(
        &self,
        service_id: &str,
        window_days: u32,
    ) -> Result<Option<LatencySliData>, EngineError>;

    /// One availability ratio per bucket, chronologically ordered, used for
    /// breach-probability and bootstrap CI estimation. Empty when no data is
    /// available.
    async fn rolling_availability(
        &self,
        service_id: &str,
        window_days: u32,
        bucket_hours: u32,
    ) -> Result<Vec<f64>, EngineError>;

    /// Fraction (0.0-1.0) of expected data points present over the window,
    /// driving the cold-start extended-lookback decision.
    async fn data_completeness(&self, service_id: &str, window_days: u32) -> Result<f64, EngineError>;
}

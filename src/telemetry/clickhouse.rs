//! Production telemetry port backed by ClickHouse, the only backend this
//! crate ships. Queries a `service_request_events` table of raw
//! success/latency events, following the `ch.query(sql).fetch_one::<Row>()`
//! idiom used elsewhere in this codebase for ClickHouse access.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use clickhouse::{Client, Row};
use serde::Deserialize;

use super::TelemetryPort;
use crate::error::EngineError;
use crate::models::{AvailabilitySliData, LatencySliData};

pub struct ClickHouseTelemetryPort {
    client: Client,
}

impl ClickHouseTelemetryPort {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Row, Deserialize)]
struct AvailabilityCountsRow {
    good: u64,
    total: u64,
}

#[derive(Row, Deserialize)]
struct LatencyPercentilesRow {
    p50: f64,
    p95: f64,
    p99: f64,
    p999: f64,
    sample_count: u64,
}

#[derive(Row, Deserialize)]
struct BucketRow {
    good: u64,
    total: u64,
}

#[derive(Row, Deserialize)]
struct CountRow {
    count: u64,
}

fn to_ch_err(e: clickhouse::error::Error) -> EngineError {
    EngineError::Transient(e.to_string())
}

const MAX_ATTEMPTS: u32 = 3;

/// Retries `query` up to [`MAX_ATTEMPTS`] total attempts with exponential
/// backoff, but only while the error is [`EngineError::is_retryable`];
/// anything else surfaces on the first failure.
async fn with_retry<T, F, Fut>(mut query: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 1;
    loop {
        match query().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                let backoff_ms = 50u64 * 2u64.pow(attempt - 1);
                tracing::warn!(attempt, backoff_ms, error = %e, "retrying clickhouse query");
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl TelemetryPort for ClickHouseTelemetryPort {
    async fn availability_sli(
        &self,
        service_id: &str,
        window_days: u32,
    ) -> Result<Option<AvailabilitySliData>, EngineError> {
        let now = Utc::now();
        let window_start = now - Duration::days(window_days as i64);

        let row: AvailabilityCountsRow = with_retry(|| async {
            self.client
                .query(
                    "SELECT countIf(success = 1) AS good, count() AS total \
                     FROM service_request_events \
                     WHERE service_id = ? AND ts >= ? AND ts < ?",
                )
                .bind(service_id)
                .bind(window_start.timestamp())
                .bind(now.timestamp())
                .fetch_one::<AvailabilityCountsRow>()
                .await
                .map_err(to_ch_err)
        })
        .await?;

        if row.total == 0 {
            return Ok(None);
        }

        Ok(Some(AvailabilitySliData::new(
            service_id,
            row.good,
            row.total,
            window_start,
            now,
            row.total,
        )?))
    }

    async fn latency_sli(
        &self,
        service_id: &str,
        window_days: u32,
    ) -> Result<Option<LatencySliData>, EngineError> {
        let now = Utc::now();
        let window_start = now - Duration::days(window_days as i64);

        let row: LatencyPercentilesRow = with_retry(|| async {
            self.client
                .query(
                    "SELECT quantile(0.50)(latency_ms) AS p50, quantile(0.95)(latency_ms) AS p95, \
                     quantile(0.99)(latency_ms) AS p99, quantile(0.999)(latency_ms) AS p999, \
                     count() AS sample_count \
                     FROM service_request_events \
                     WHERE service_id = ? AND ts >= ? AND ts < ?",
                )
                .bind(service_id)
                .bind(window_start.timestamp())
                .bind(now.timestamp())
                .fetch_one::<LatencyPercentilesRow>()
                .await
                .map_err(to_ch_err)
        })
        .await?;

        if row.sample_count == 0 {
            return Ok(None);
        }

        Ok(Some(LatencySliData::new(
            row.p50, row.p95, row.p99, row.p999, window_start, now, row.sample_count,
        )?))
    }

    async fn rolling_availability(
        &self,
        service_id: &str,
        window_days: u32,
        bucket_hours: u32,
    ) -> Result<Vec<f64>, EngineError> {
        let now = Utc::now();
        let window_start = now - Duration::days(window_days as i64);

        let rows: Vec<BucketRow> = with_retry(|| async {
            self.client
                .query(
                    "SELECT countIf(success = 1) AS good, count() AS total \
                     FROM service_request_events \
                     WHERE service_id = ? AND ts >= ? AND ts < ? \
                     GROUP BY toStartOfInterval(ts, INTERVAL ? HOUR) \
                     ORDER BY toStartOfInterval(ts, INTERVAL ? HOUR)",
                )
                .bind(service_id)
                .bind(window_start.timestamp())
                .bind(now.timestamp())
                .bind(bucket_hours)
                .bind(bucket_hours)
                .fetch_all::<BucketRow>()
                .await
                .map_err(to_ch_err)
        })
        .await?;

        Ok(rows
            .into_iter()
            .filter(|r| r.total > 0)
            .map(|r| r.good as f64 / r.total as f64)
            .collect())
    }

    async fn data_completeness(&self, service_id: &str, window_days: u32) -> Result<f64, EngineError> {
        let now = Utc::now();
        let window_start = now - Duration::days(window_days as i64);

        let distinct_hours: u64 = with_retry(|| async {
            self.client
                .query(
                    "SELECT count(DISTINCT toStartOfHour(ts)) AS count \
                     FROM service_request_events \
                     WHERE service_id = ? AND ts >= ? AND ts < ?",
                )
                .bind(service_id)
                .bind(window_start.timestamp())
                .bind(now.timestamp())
                .fetch_one::<CountRow>()
                .await
                .map_err(to_ch_err)
                .map(|row| row.count)
        })
        .await?;

        let expected_hours = (window_days as u64) * 24;
        if expected_hours == 0 {
            return Ok(0.0);
        }
        Ok((distinct_hours as f64 / expected_hours as f64).min(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn with_retry_gives_up_after_max_attempts_on_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, EngineError> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Transient("backend unavailable".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_non_transient_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, EngineError> = with_retry(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::InvalidInput("malformed query".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_retry_succeeds_once_the_transient_failure_clears() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| async {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < 2 {
                Err(EngineError::Transient("flaky".to_string()))
            } else {
                Ok(42u32)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

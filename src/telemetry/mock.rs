//! Seeded mock telemetry: a handful of named scenarios for well-known demo
//! services, falling back to a deterministic-but-varied synthetic profile
//! derived from the service id's hash for anything else. Used in development
//! and by the crate's own tests; [`super::clickhouse::ClickHouseTelemetryPort`]
//! is what a production deployment wires instead.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::TelemetryPort;
use crate::error::EngineError;
use crate::models::{AvailabilitySliData, LatencySliData};

#[derive(Debug, Clone, Copy)]
struct LatencyProfile {
    p50_ms: f64,
    p95_ms: f64,
    p99_ms: f64,
    p999_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct ServiceProfile {
    base_availability: f64,
    variance: f64,
    good_events: u64,
    total_events: u64,
    sample_count: u64,
    latency: LatencyProfile,
    days_available: u32,
    completeness_30d: f64,
    completeness_90d: f64,
}

fn seed_table() -> HashMap<&'static str, ServiceProfile> {
    HashMap::from([
        (
            "payment-service",
            ServiceProfile {
                base_availability: 0.9950,
                variance: 0.003,
                good_events: 9_950_000,
                total_events: 10_000_000,
                sample_count: 720,
                latency: LatencyProfile { p50_ms: 45.0, p95_ms: 120.0, p99_ms: 250.0, p999_ms: 500.0 },
                days_available: 30,
                completeness_30d: 0.98,
                completeness_90d: 0.96,
            },
        ),
        (
            "auth-service",
            ServiceProfile {
                base_availability: 0.9990,
                variance: 0.001,
                good_events: 19_980_000,
                total_events: 20_000_000,
                sample_count: 720,
                latency: LatencyProfile { p50_ms: 25.0, p95_ms: 80.0, p99_ms: 150.0, p999_ms: 300.0 },
                days_available: 30,
                completeness_30d: 0.99,
                completeness_90d: 0.98,
            },
        ),
        (
            "notification-service",
            ServiceProfile {
                base_availability: 0.9900,
                variance: 0.010,
                good_events: 4_950_000,
                total_events: 5_000_000,
                sample_count: 720,
                latency: LatencyProfile { p50_ms: 100.0, p95_ms: 350.0, p99_ms: 800.0, p999_ms: 1500.0 },
                days_available: 30,
                completeness_30d: 0.95,
                completeness_90d: 0.93,
            },
        ),
        (
            "analytics-service",
            ServiceProfile {
                base_availability: 0.9800,
                variance: 0.008,
                good_events: 2_940_000,
                total_events: 3_000_000,
                sample_count: 720,
                latency: LatencyProfile { p50_ms: 200.0, p95_ms: 600.0, p99_ms: 1200.0, p999_ms: 2200.0 },
                days_available: 30,
                completeness_30d: 0.90,
                completeness_90d: 0.85,
            },
        ),
    ])
}

fn hash_seed(service_id: &str, salt: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    service_id.hash(&mut hasher);
    salt.hash(&mut hasher);
    hasher.finish()
}

/// Synthesizes a plausible profile for a service id absent from the named
/// seed table, so batch runs over auto-discovered services still see data.
fn synthesize_profile(service_id: &str) -> ServiceProfile {
    let mut rng = StdRng::seed_from_u64(hash_seed(service_id, 0));
    let base_availability = rng.random_range(0.970..0.9995);
    let variance = rng.random_range(0.001..0.012);
    let total_events = rng.random_range(500_000..5_000_000u64);
    let good_events = (total_events as f64 * base_availability) as u64;
    let p50 = rng.random_range(20.0..150.0);
    ServiceProfile {
        base_availability,
        variance,
        good_events,
        total_events,
        sample_count: 720,
        latency: LatencyProfile {
            p50_ms: p50,
            p95_ms: p50 * rng.random_range(2.5..4.0),
            p99_ms: p50 * rng.random_range(4.5..7.0),
            p999_ms: p50 * rng.random_range(8.0..14.0),
        },
        days_available: 30,
        completeness_30d: rng.random_range(0.80..0.99),
        completeness_90d: rng.random_range(0.70..0.95),
    }
}

/// Box-Muller standard normal sample from two independent uniforms.
fn gaussian(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    mean + z * std_dev
}

pub struct SeededMockTelemetryPort {
    seeds: HashMap<&'static str, ServiceProfile>,
    failing_services: std::collections::HashSet<String>,
}

impl SeededMockTelemetryPort {
    pub fn new() -> Self {
        Self { seeds: seed_table(), failing_services: std::collections::HashSet::new() }
    }

    /// Makes every operation for `service_id` return a `Transient` error,
    /// for exercising callers that must not let one service's telemetry
    /// failure abort a batch over several services.
    pub fn with_failure(mut self, service_id: impl Into<String>) -> Self {
        self.failing_services.insert(service_id.into());
        self
    }

    fn profile(&self, service_id: &str) -> ServiceProfile {
        self.seeds.get(service_id).copied().unwrap_or_else(|| synthesize_profile(service_id))
    }

    fn check_failure(&self, service_id: &str) -> Result<(), EngineError> {
        if self.failing_services.contains(service_id) {
            return Err(EngineError::Transient(format!(
                "mock telemetry backend unavailable for '{service_id}'"
            )));
        }
        Ok(())
    }
}

impl Default for SeededMockTelemetryPort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryPort for SeededMockTelemetryPort {
    async fn availability_sli(
        &self,
        service_id: &str,
        window_days: u32,
    ) -> Result<Option<AvailabilitySliData>, EngineError> {
        self.check_failure(service_id)?;
        let profile = self.profile(service_id);
        if window_days > profile.days_available {
            return Ok(None);
        }
        let scale = window_days as f64 / profile.days_available as f64;
        let good_events = (profile.good_events as f64 * scale) as u64;
        let total_events = (profile.total_events as f64 * scale) as u64;
        let sample_count = (profile.sample_count as f64 * scale) as u64;
        let now = Utc::now();
        let window_start = now - Duration::days(window_days as i64);
        Ok(Some(AvailabilitySliData::new(
            service_id,
            good_events,
            total_events,
            window_start,
            now,
            sample_count,
        )?))
    }

    async fn latency_sli(
        &self,
        service_id: &str,
        window_days: u32,
    ) -> Result<Option<LatencySliData>, EngineError> {
        self.check_failure(service_id)?;
        let profile = self.profile(service_id);
        if window_days > profile.days_available {
            return Ok(None);
        }
        let scale = window_days as f64 / profile.days_available as f64;
        let sample_count = (profile.sample_count as f64 * scale) as u64;
        let now = Utc::now();
        let window_start = now - Duration::days(window_days as i64);
        Ok(Some(LatencySliData::new(
            profile.latency.p50_ms,
            profile.latency.p95_ms,
            profile.latency.p99_ms,
            profile.latency.p999_ms,
            window_start,
            now,
            sample_count,
        )?))
    }

    async fn rolling_availability(
        &self,
        service_id: &str,
        window_days: u32,
        bucket_hours: u32,
    ) -> Result<Vec<f64>, EngineError> {
        self.check_failure(service_id)?;
        let profile = self.profile(service_id);
        if window_days > profile.days_available || bucket_hours == 0 {
            return Ok(Vec::new());
        }
        let num_buckets = (window_days as u64 * 24) / bucket_hours as u64;
        let mut rng = StdRng::seed_from_u64(hash_seed(service_id, window_days as u64));
        Ok((0..num_buckets)
            .map(|_| gaussian(&mut rng, profile.base_availability, profile.variance).clamp(0.0, 1.0))
            .collect())
    }

    async fn data_completeness(&self, service_id: &str, window_days: u32) -> Result<f64, EngineError> {
        self.check_failure(service_id)?;
        let profile = self.profile(service_id);
        Ok(match window_days {
            30 => profile.completeness_30d,
            90 => profile.completeness_90d,
            days if profile.days_available > 0 => (profile.days_available as f64 / days as f64).min(1.0),
            _ => 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_service_returns_seeded_data() {
        let port = SeededMockTelemetryPort::new();
        let sli = port.availability_sli("auth-service", 30).await.unwrap().unwrap();
        assert!((sli.ratio() - 0.999).abs() < 0.001);
    }

    #[tokio::test]
    async fn window_longer_than_available_history_yields_none() {
        let port = SeededMockTelemetryPort::new();
        assert!(port.availability_sli("auth-service", 90).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_service_is_synthesized_deterministically() {
        let port = SeededMockTelemetryPort::new();
        let a = port.availability_sli("checkout-service", 30).await.unwrap().unwrap();
        let b = port.availability_sli("checkout-service", 30).await.unwrap().unwrap();
        assert_eq!(a.good_events, b.good_events);
        assert_eq!(a.total_events, b.total_events);
    }

    #[tokio::test]
    async fn rolling_availability_bucket_count_matches_window() {
        let port = SeededMockTelemetryPort::new();
        let buckets = port.rolling_availability("payment-service", 30, 24).await.unwrap();
        assert_eq!(buckets.len(), 30);
        assert!(buckets.iter().all(|&b| (0.0..=1.0).contains(&b)));
    }

    #[tokio::test]
    async fn with_failure_only_breaks_the_named_service() {
        let port = SeededMockTelemetryPort::new().with_failure("payment-service");
        assert!(port.availability_sli("payment-service", 30).await.is_err());
        assert!(port.availability_sli("auth-service", 30).await.unwrap().is_some());
    }
}

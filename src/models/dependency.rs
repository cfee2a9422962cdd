use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationMode {
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCriticality {
    Hard,
    Soft,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Manual,
    OtelServiceGraph,
    Kubernetes,
    ServiceMesh,
}

/// Optional retry policy carried on an edge, modeled as a nested value
/// object rather than flattened fields.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
}

/// A directed edge in the dependency graph. Uniqueness key is
/// `(source_id, target_id, discovery_source)` — the same logical dependency
/// may be reported by multiple discovery mechanisms and is merged on replay,
/// not duplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDependency {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub communication_mode: CommunicationMode,
    pub criticality: DependencyCriticality,
    pub protocol: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retry_config: Option<RetryConfig>,
    pub discovery_source: DiscoverySource,
    pub confidence: f64,
    pub last_observed_at: DateTime<Utc>,
    pub is_stale: bool,
}

/// Fields accepted on upsert; resolved against business ids by the graph
/// store, which assigns (or auto-discovers) the internal service ids.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeUpsert {
    pub source_business_id: String,
    pub target_business_id: String,
    pub communication_mode: CommunicationMode,
    pub criticality: DependencyCriticality,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_config: Option<RetryConfig>,
    pub discovery_source: DiscoverySource,
    pub confidence: f64,
}

impl EdgeUpsert {
    /// Invariant: no self-loops, confidence in [0,1].
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.source_business_id == self.target_business_id {
            return Err(EngineError::invalid(format!(
                "self-loop not permitted: '{}' -> '{}'",
                self.source_business_id, self.target_business_id
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(EngineError::invalid(format!(
                "confidence must be in [0,1], got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

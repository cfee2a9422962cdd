use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Internal,
    External,
}

/// A node in the dependency graph. `internal_id` is assigned at first
/// insert; `business_id` is the stable, globally-unique identifier callers
/// address the service by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub internal_id: Uuid,
    pub business_id: String,
    pub criticality: Criticality,
    pub owning_team: Option<String>,
    pub service_type: ServiceType,
    pub published_sla: Option<f64>,
    pub metadata: HashMap<String, String>,
    pub discovered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted on upsert; `internal_id`/timestamps are assigned by the
/// store.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceUpsert {
    pub business_id: String,
    pub criticality: Criticality,
    #[serde(default)]
    pub owning_team: Option<String>,
    pub service_type: ServiceType,
    #[serde(default)]
    pub published_sla: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub discovered: bool,
}

impl ServiceUpsert {
    /// Validates the invariants: non-empty business id, and
    /// `type=external implies published SLA present`.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.business_id.trim().is_empty() {
            return Err(EngineError::invalid("business_id must not be empty"));
        }
        if self.service_type == ServiceType::External && self.published_sla.is_none() {
            return Err(EngineError::invalid(format!(
                "service '{}' is external and must carry a published_sla",
                self.business_id
            )));
        }
        if let Some(sla) = self.published_sla {
            if !(0.0..=1.0).contains(&sla) {
                return Err(EngineError::invalid(format!(
                    "published_sla must be in [0,1], got {sla}"
                )));
            }
        }
        Ok(())
    }

    /// A minimal upsert used when the graph store auto-discovers a service
    /// from an unknown edge reference: sets the `discovered` flag and the
    /// `source=auto_discovered` metadata marker.
    pub fn discovered(business_id: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "auto_discovered".to_string());
        Self {
            business_id: business_id.into(),
            criticality: Criticality::Medium,
            owning_team: None,
            service_type: ServiceType::Internal,
            published_sla: None,
            metadata,
            discovered: true,
        }
    }
}

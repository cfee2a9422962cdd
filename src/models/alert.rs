use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Resolved,
}

/// A detected cycle in the dependency graph. `cycle_path` holds
/// the member business ids in the order Tarjan popped them off its SCC
/// stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircularDependencyAlert {
    pub id: Uuid,
    pub cycle_path: Vec<String>,
    pub status: AlertStatus,
    pub acknowledger: Option<String>,
    pub resolution_note: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl CircularDependencyAlert {
    pub fn new(cycle_path: Vec<String>) -> Result<Self, EngineError> {
        if cycle_path.len() < 2 {
            return Err(EngineError::invalid(
                "cycle_path must name at least two services",
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            cycle_path,
            status: AlertStatus::Open,
            acknowledger: None,
            resolution_note: None,
            detected_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
        })
    }

    /// `open -> acknowledged` requires an acknowledger.
    pub fn acknowledge(&mut self, acknowledger: impl Into<String>) -> Result<(), EngineError> {
        if self.status == AlertStatus::Resolved {
            return Err(EngineError::invalid(
                "resolved alerts cannot be re-acknowledged",
            ));
        }
        self.acknowledger = Some(acknowledger.into());
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_at = Some(Utc::now());
        Ok(())
    }

    /// `any -> resolved` requires a non-empty note.
    pub fn resolve(&mut self, note: impl Into<String>) -> Result<(), EngineError> {
        let note = note.into();
        if note.trim().is_empty() {
            return Err(EngineError::invalid(
                "resolving a circular-dependency alert requires a non-empty note",
            ));
        }
        self.resolution_note = Some(note);
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }

    /// Stable key used to dedupe re-detected cycles across runs: the sorted
    /// set of member business ids, independent of cycle order, so the same
    /// cycle doesn't spawn a new open alert on every sweep.
    pub fn dedupe_key(cycle_path: &[String]) -> String {
        let mut sorted: Vec<&str> = cycle_path.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.join("\u{1f}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledge_requires_acknowledger_and_sets_status() {
        let mut alert = CircularDependencyAlert::new(vec!["a".into(), "b".into()]).unwrap();
        alert.acknowledge("oncall-lee").unwrap();
        assert_eq!(alert.status, AlertStatus::Acknowledged);
        assert_eq!(alert.acknowledger.as_deref(), Some("oncall-lee"));
    }

    #[test]
    fn resolve_requires_non_empty_note() {
        let mut alert = CircularDependencyAlert::new(vec!["a".into(), "b".into()]).unwrap();
        assert!(alert.resolve("   ").is_err());
        alert.resolve("split the cycle via an async queue").unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
    }

    #[test]
    fn resolved_alert_cannot_be_reacknowledged() {
        let mut alert = CircularDependencyAlert::new(vec!["a".into(), "b".into()]).unwrap();
        alert.resolve("fixed").unwrap();
        assert!(alert.acknowledge("someone").is_err());
    }

    #[test]
    fn dedupe_key_is_order_independent() {
        let k1 = CircularDependencyAlert::dedupe_key(&["a".into(), "b".into(), "c".into()]);
        let k2 = CircularDependencyAlert::dedupe_key(&["c".into(), "a".into(), "b".into()]);
        assert_eq!(k1, k2);
    }
}

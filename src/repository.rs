//! Recommendation Repository (C8): persists generated recommendations and
//! enforces that at most one `Active` row exists per
//! `(service_internal_id, sli_type)` at any quiescent moment, via a
//! supersede-then-insert transaction.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    DataQuality, Explanation, RecommendationStatus, RecommendationTier, SliType, SloRecommendation,
    TierLevel,
};

pub struct RecommendationRepository {
    conn: Mutex<Connection>,
}

impl RecommendationRepository {
    pub fn open(path: &str) -> Result<Self, EngineError> {
        let conn = Connection::open(path).map_err(EngineError::from)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(EngineError::from)?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.run_migrations()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory().map_err(EngineError::from)?;
        let repo = Self { conn: Mutex::new(conn) };
        repo.run_migrations()?;
        Ok(repo)
    }

    fn run_migrations(&self) -> Result<(), EngineError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS slo_recommendations (
                id                  TEXT PRIMARY KEY,
                service_internal_id TEXT NOT NULL,
                sli_type            TEXT NOT NULL,
                metric_name         TEXT NOT NULL,
                tiers               TEXT NOT NULL,
                explanation         TEXT NOT NULL,
                data_quality        TEXT NOT NULL,
                lookback_start      TEXT NOT NULL,
                lookback_end        TEXT NOT NULL,
                generated_at        TEXT NOT NULL,
                expires_at          TEXT NOT NULL,
                status              TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reco_active_lookup
                ON slo_recommendations(service_internal_id, sli_type, status);
            CREATE INDEX IF NOT EXISTS idx_reco_expires_at ON slo_recommendations(expires_at);
            ",
        )
        .map_err(EngineError::from)?;
        Ok(())
    }

    /// The current `Active` recommendation for a service/SLI pair, if one
    /// exists and has not expired. Callers decide whether to return a
    /// cached row or regenerate; this method does not itself check expiry
    /// against `Utc::now()` so a caller inspecting a stale-but-still-`Active`
    /// row mid-sweep observes a consistent snapshot.
    pub fn get_active(
        &self,
        service_internal_id: Uuid,
        sli_type: SliType,
    ) -> Result<Option<SloRecommendation>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!(
                    "{SELECT} WHERE service_internal_id = ?1 AND sli_type = ?2 AND status = 'active' \
                     ORDER BY generated_at DESC LIMIT 1"
                ),
                params![service_internal_id.to_string(), sli_type_str(sli_type)],
                row_to_raw,
            )
            .optional()
            .map_err(EngineError::from)?;
        raw.map(parse_raw).transpose()
    }

    pub fn get(&self, id: Uuid) -> Result<Option<SloRecommendation>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(&format!("{SELECT} WHERE id = ?1"), params![id.to_string()], row_to_raw)
            .optional()
            .map_err(EngineError::from)?;
        raw.map(parse_raw).transpose()
    }

    pub fn list_for_service(&self, service_internal_id: Uuid) -> Result<Vec<SloRecommendation>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!("{SELECT} WHERE service_internal_id = ?1 ORDER BY generated_at DESC"))
            .map_err(EngineError::from)?;
        let raw_rows = stmt
            .query_map(params![service_internal_id.to_string()], row_to_raw)
            .map_err(EngineError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(EngineError::from)?;
        raw_rows.into_iter().map(parse_raw).collect()
    }

    /// Marks any existing `Active` row for this `(service, sli_type)` as
    /// `Superseded` and inserts `recommendation` as the new `Active` row, in
    /// one transaction, preserving the at-most-one-active-row-per-service-
    /// per-SLI-type invariant.
    pub fn save(&self, recommendation: &SloRecommendation) -> Result<(), EngineError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(EngineError::from)?;
        supersede_existing_tx(&tx, recommendation.service_internal_id, recommendation.sli_type)?;
        insert_recommendation(&tx, recommendation)?;
        tx.commit().map_err(EngineError::from)?;
        Ok(())
    }

    /// Marks every `Active` row for this `(service, sli_type)` as
    /// `Superseded`, independent of any save. Returns the number of rows
    /// transitioned; idempotent — a second call with nothing left active
    /// returns 0.
    pub fn supersede_existing(&self, service_internal_id: Uuid, sli_type: SliType) -> Result<usize, EngineError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE slo_recommendations SET status = 'superseded' \
             WHERE service_internal_id = ?1 AND sli_type = ?2 AND status = 'active'",
            params![service_internal_id.to_string(), sli_type_str(sli_type)],
        )
        .map_err(EngineError::from)
    }

    /// Batch form of [`save`](Self::save), used by the batch orchestrator
    /// (C10) so a whole scoring run commits atomically per-service but does
    /// not hold one giant transaction across hundreds of services.
    pub fn save_batch(&self, recommendations: &[SloRecommendation]) -> Result<(), EngineError> {
        for recommendation in recommendations {
            self.save(recommendation)?;
        }
        Ok(())
    }

    /// Marks every `Active` row whose `expires_at` has passed as `Expired`.
    /// Idempotent; returns the number of rows transitioned.
    pub fn expire_stale(&self) -> Result<usize, EngineError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let count = conn
            .execute(
                "UPDATE slo_recommendations SET status = 'expired' \
                 WHERE status = 'active' AND expires_at < ?1",
                params![now],
            )
            .map_err(EngineError::from)?;
        Ok(count)
    }
}

const SELECT: &str = "SELECT id, service_internal_id, sli_type, metric_name, tiers, explanation, \
     data_quality, lookback_start, lookback_end, generated_at, expires_at, status \
     FROM slo_recommendations";

fn supersede_existing_tx(conn: &Connection, service_internal_id: Uuid, sli_type: SliType) -> Result<(), EngineError> {
    conn.execute(
        "UPDATE slo_recommendations SET status = 'superseded' \
         WHERE service_internal_id = ?1 AND sli_type = ?2 AND status = 'active'",
        params![service_internal_id.to_string(), sli_type_str(sli_type)],
    )
    .map_err(EngineError::from)?;
    Ok(())
}

fn insert_recommendation(conn: &Connection, recommendation: &SloRecommendation) -> Result<(), EngineError> {
    let tiers_json = serialize_tiers(&recommendation.tiers)?;
    let explanation_json =
        serde_json::to_string(&recommendation.explanation).map_err(|e| EngineError::Fatal(e.to_string()))?;
    let data_quality_json =
        serde_json::to_string(&recommendation.data_quality).map_err(|e| EngineError::Fatal(e.to_string()))?;

    conn.execute(
        "INSERT INTO slo_recommendations (id, service_internal_id, sli_type, metric_name, tiers, \
         explanation, data_quality, lookback_start, lookback_end, generated_at, expires_at, status) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            recommendation.id.to_string(),
            recommendation.service_internal_id.to_string(),
            sli_type_str(recommendation.sli_type),
            recommendation.metric_name,
            tiers_json,
            explanation_json,
            data_quality_json,
            recommendation.lookback_start.to_rfc3339(),
            recommendation.lookback_end.to_rfc3339(),
            recommendation.generated_at.to_rfc3339(),
            recommendation.expires_at.to_rfc3339(),
            recommendation_status_str(recommendation.status),
        ],
    )
    .map_err(EngineError::from)?;
    Ok(())
}

fn serialize_tiers(tiers: &HashMap<TierLevel, RecommendationTier>) -> Result<String, EngineError> {
    let as_map: HashMap<&'static str, &RecommendationTier> =
        tiers.iter().map(|(level, tier)| (tier_level_str(*level), tier)).collect();
    serde_json::to_string(&as_map).map_err(|e| EngineError::Fatal(e.to_string()))
}

fn deserialize_tiers(raw: &str) -> Result<HashMap<TierLevel, RecommendationTier>, EngineError> {
    let as_map: HashMap<String, RecommendationTier> =
        serde_json::from_str(raw).map_err(|e| EngineError::Fatal(e.to_string()))?;
    Ok(as_map
        .into_iter()
        .map(|(level, tier)| (parse_tier_level(&level), tier))
        .collect())
}

struct RawRecommendationRow {
    id: String,
    service_internal_id: String,
    sli_type: String,
    metric_name: String,
    tiers_json: String,
    explanation_json: String,
    data_quality_json: String,
    lookback_start: String,
    lookback_end: String,
    generated_at: String,
    expires_at: String,
    status: String,
}

fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<RawRecommendationRow> {
    Ok(RawRecommendationRow {
        id: row.get(0)?,
        service_internal_id: row.get(1)?,
        sli_type: row.get(2)?,
        metric_name: row.get(3)?,
        tiers_json: row.get(4)?,
        explanation_json: row.get(5)?,
        data_quality_json: row.get(6)?,
        lookback_start: row.get(7)?,
        lookback_end: row.get(8)?,
        generated_at: row.get(9)?,
        expires_at: row.get(10)?,
        status: row.get(11)?,
    })
}

fn parse_raw(raw: RawRecommendationRow) -> Result<SloRecommendation, EngineError> {
    let tiers = deserialize_tiers(&raw.tiers_json)?;
    let explanation: Explanation =
        serde_json::from_str(&raw.explanation_json).map_err(|e| EngineError::Fatal(e.to_string()))?;
    let data_quality: DataQuality =
        serde_json::from_str(&raw.data_quality_json).map_err(|e| EngineError::Fatal(e.to_string()))?;
    Ok(SloRecommendation {
        id: parse_uuid(&raw.id)?,
        service_internal_id: parse_uuid(&raw.service_internal_id)?,
        sli_type: parse_sli_type(&raw.sli_type),
        metric_name: raw.metric_name,
        tiers,
        explanation,
        data_quality,
        lookback_start: parse_datetime(&raw.lookback_start),
        lookback_end: parse_datetime(&raw.lookback_end),
        generated_at: parse_datetime(&raw.generated_at),
        expires_at: parse_datetime(&raw.expires_at),
        status: parse_recommendation_status(&raw.status),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_uuid(s: &str) -> Result<Uuid, EngineError> {
    s.parse().map_err(|_| EngineError::Fatal(format!("invalid uuid stored: {s}")))
}

fn sli_type_str(t: SliType) -> &'static str {
    match t {
        SliType::Availability => "availability",
        SliType::Latency => "latency",
    }
}
fn parse_sli_type(s: &str) -> SliType {
    match s {
        "latency" => SliType::Latency,
        _ => SliType::Availability,
    }
}

fn tier_level_str(t: TierLevel) -> &'static str {
    match t {
        TierLevel::Conservative => "conservative",
        TierLevel::Balanced => "balanced",
        TierLevel::Aggressive => "aggressive",
    }
}
fn parse_tier_level(s: &str) -> TierLevel {
    match s {
        "conservative" => TierLevel::Conservative,
        "aggressive" => TierLevel::Aggressive,
        _ => TierLevel::Balanced,
    }
}

fn recommendation_status_str(s: RecommendationStatus) -> &'static str {
    match s {
        RecommendationStatus::Active => "active",
        RecommendationStatus::Superseded => "superseded",
        RecommendationStatus::Expired => "expired",
    }
}
fn parse_recommendation_status(s: &str) -> RecommendationStatus {
    match s {
        "superseded" => RecommendationStatus::Superseded,
        "expired" => RecommendationStatus::Expired,
        _ => RecommendationStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataQuality, Explanation};
    use chrono::Duration;

    fn sample(service_id: Uuid, sli_type: SliType) -> SloRecommendation {
        let mut tiers = HashMap::new();
        tiers.insert(
            TierLevel::Balanced,
            RecommendationTier {
                level: TierLevel::Balanced,
                target: 99.9,
                error_budget_monthly_minutes: Some(43.2),
                breach_probability: 0.01,
                confidence_interval: Some((99.8, 99.95)),
                percentile: None,
                target_ms: None,
            },
        );
        let explanation = Explanation {
            summary: "driven by historical availability".to_string(),
            attributions: vec![],
            dependency_impact: None,
        };
        let data_quality = DataQuality {
            completeness: 0.95,
            gaps: vec![],
            confidence_note: "sufficient data".to_string(),
            cold_start: false,
            actual_lookback_days: 30,
        };
        let now = Utc::now();
        SloRecommendation::new(service_id, sli_type, tiers, explanation, data_quality, now - Duration::days(30), now, 24)
    }

    #[test]
    fn save_then_get_active_round_trips() {
        let repo = RecommendationRepository::open_in_memory().unwrap();
        let service_id = Uuid::new_v4();
        let rec = sample(service_id, SliType::Availability);
        repo.save(&rec).unwrap();

        let active = repo.get_active(service_id, SliType::Availability).unwrap().unwrap();
        assert_eq!(active.id, rec.id);
        assert_eq!(active.status, RecommendationStatus::Active);
    }

    #[test]
    fn saving_a_new_recommendation_supersedes_the_old_one() {
        let repo = RecommendationRepository::open_in_memory().unwrap();
        let service_id = Uuid::new_v4();
        let first = sample(service_id, SliType::Availability);
        repo.save(&first).unwrap();
        let second = sample(service_id, SliType::Availability);
        repo.save(&second).unwrap();

        let active = repo.get_active(service_id, SliType::Availability).unwrap().unwrap();
        assert_eq!(active.id, second.id);

        let all = repo.list_for_service(service_id).unwrap();
        assert_eq!(all.len(), 2);
        let superseded = all.iter().find(|r| r.id == first.id).unwrap();
        assert_eq!(superseded.status, RecommendationStatus::Superseded);
    }

    #[test]
    fn distinct_sli_types_do_not_supersede_each_other() {
        let repo = RecommendationRepository::open_in_memory().unwrap();
        let service_id = Uuid::new_v4();
        repo.save(&sample(service_id, SliType::Availability)).unwrap();
        repo.save(&sample(service_id, SliType::Latency)).unwrap();

        assert!(repo.get_active(service_id, SliType::Availability).unwrap().is_some());
        assert!(repo.get_active(service_id, SliType::Latency).unwrap().is_some());
    }

    #[test]
    fn supersede_existing_is_idempotent_and_independently_testable() {
        let repo = RecommendationRepository::open_in_memory().unwrap();
        let service_id = Uuid::new_v4();
        repo.save(&sample(service_id, SliType::Availability)).unwrap();

        let first = repo.supersede_existing(service_id, SliType::Availability).unwrap();
        assert_eq!(first, 1);
        assert!(repo.get_active(service_id, SliType::Availability).unwrap().is_none());

        let second = repo.supersede_existing(service_id, SliType::Availability).unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn expire_stale_transitions_only_expired_active_rows() {
        let repo = RecommendationRepository::open_in_memory().unwrap();
        let service_id = Uuid::new_v4();
        let rec = sample(service_id, SliType::Availability);
        repo.save(&rec).unwrap();
        {
            let conn = repo.conn.lock().unwrap();
            conn.execute("UPDATE slo_recommendations SET expires_at = '2000-01-01T00:00:00Z'", [])
                .unwrap();
        }
        let count = repo.expire_stale().unwrap();
        assert_eq!(count, 1);
        assert!(repo.get_active(service_id, SliType::Availability).unwrap().is_none());
        assert_eq!(repo.expire_stale().unwrap(), 0);
    }

    #[test]
    fn file_backed_repository_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("recommendations.db");
        let db_path = db_path.to_str().unwrap();
        let service_id = Uuid::new_v4();

        {
            let repo = RecommendationRepository::open(db_path).unwrap();
            repo.save(&sample(service_id, SliType::Availability)).unwrap();
        }

        let reopened = RecommendationRepository::open(db_path).unwrap();
        assert!(reopened.get_active(service_id, SliType::Availability).unwrap().is_some());
    }
}

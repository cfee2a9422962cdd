//! Graph Store (C1): persists services and dependency edges, performs
//! bounded-depth traversal, adjacency snapshots for the cycle detector, and
//! staleness sweeps. SQLite-backed via `rusqlite`, using a
//! `Mutex<Connection>` and idempotent `execute_batch` migrations.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::alert::{AlertStatus, CircularDependencyAlert};
use crate::models::dependency::{
    CommunicationMode, DependencyCriticality, DiscoverySource, EdgeUpsert, RetryConfig,
    ServiceDependency,
};
use crate::models::service::{Criticality, Service, ServiceType, ServiceUpsert};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    Downstream,
    Upstream,
    Both,
}

pub struct GraphStore {
    conn: Mutex<Connection>,
}

impl GraphStore {
    pub fn open(path: &str) -> Result<Self, EngineError> {
        let conn = Connection::open(path).map_err(EngineError::from)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(EngineError::from)?;
        let store = Self { conn: Mutex::new(conn) };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory().map_err(EngineError::from)?;
        let store = Self { conn: Mutex::new(conn) };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<(), EngineError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS services (
                internal_id    TEXT PRIMARY KEY,
                business_id    TEXT NOT NULL UNIQUE,
                criticality    TEXT NOT NULL,
                owning_team    TEXT,
                service_type   TEXT NOT NULL,
                published_sla  REAL,
                metadata       TEXT NOT NULL DEFAULT '{}',
                discovered     INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                updated_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );

            CREATE TABLE IF NOT EXISTS service_dependencies (
                id                       TEXT PRIMARY KEY,
                source_id                TEXT NOT NULL REFERENCES services(internal_id),
                target_id                TEXT NOT NULL REFERENCES services(internal_id),
                communication_mode       TEXT NOT NULL,
                criticality              TEXT NOT NULL,
                protocol                 TEXT,
                timeout_ms               INTEGER,
                retry_max_attempts       INTEGER,
                retry_initial_backoff_ms INTEGER,
                discovery_source         TEXT NOT NULL,
                confidence               REAL NOT NULL,
                last_observed_at         TEXT NOT NULL,
                is_stale                 INTEGER NOT NULL DEFAULT 0,
                UNIQUE(source_id, target_id, discovery_source)
            );
            CREATE INDEX IF NOT EXISTS idx_deps_source ON service_dependencies(source_id);
            CREATE INDEX IF NOT EXISTS idx_deps_target ON service_dependencies(target_id);

            CREATE TABLE IF NOT EXISTS circular_dependency_alerts (
                id               TEXT PRIMARY KEY,
                cycle_path       TEXT NOT NULL,
                dedupe_key       TEXT NOT NULL UNIQUE,
                status           TEXT NOT NULL,
                acknowledger     TEXT,
                resolution_note  TEXT,
                detected_at      TEXT NOT NULL,
                acknowledged_at  TEXT,
                resolved_at      TEXT
            );
            ",
        )
        .map_err(EngineError::from)?;
        Ok(())
    }

    // ── Services ──

    pub fn upsert_services(&self, batch: &[ServiceUpsert]) -> Result<Vec<Service>, EngineError> {
        for item in batch {
            item.validate()?;
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(EngineError::from)?;
        let mut result = Vec::with_capacity(batch.len());
        for item in batch {
            result.push(upsert_one_service(&tx, item)?);
        }
        tx.commit().map_err(EngineError::from)?;
        Ok(result)
    }

    pub fn get_service(&self, business_id: &str) -> Result<Option<Service>, EngineError> {
        let conn = self.conn.lock().unwrap();
        query_service(&conn, "business_id", business_id)
    }

    pub fn get_service_by_internal_id(&self, internal_id: Uuid) -> Result<Option<Service>, EngineError> {
        let conn = self.conn.lock().unwrap();
        query_service(&conn, "internal_id", &internal_id.to_string())
    }

    pub fn list_services(&self, skip: u32, limit: u32) -> Result<Vec<Service>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT internal_id, business_id, criticality, owning_team, service_type, \
                 published_sla, metadata, discovered, created_at, updated_at \
                 FROM services ORDER BY created_at ASC LIMIT ?1 OFFSET ?2",
            )
            .map_err(EngineError::from)?;
        let rows = stmt
            .query_map(params![limit, skip], row_to_service)
            .map_err(EngineError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(EngineError::from)?;
        Ok(rows)
    }

    // ── Edges ──

    pub fn upsert_edges(&self, batch: &[EdgeUpsert]) -> Result<Vec<ServiceDependency>, EngineError> {
        for item in batch {
            item.validate()?;
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(EngineError::from)?;
        let mut result = Vec::with_capacity(batch.len());
        for item in batch {
            let source = resolve_or_discover(&tx, &item.source_business_id)?;
            let target = resolve_or_discover(&tx, &item.target_business_id)?;
            result.push(upsert_one_edge(&tx, item, source, target)?);
        }
        tx.commit().map_err(EngineError::from)?;
        Ok(result)
    }

    /// BFS from `root_business_id` up to `max_depth`, cycle-safe: a node
    /// already reached is never re-expanded. Stale edges are omitted from
    /// expansion unless `include_stale`.
    pub fn traverse(
        &self,
        root_business_id: &str,
        direction: TraversalDirection,
        max_depth: u32,
        include_stale: bool,
    ) -> Result<(Vec<Service>, Vec<ServiceDependency>), EngineError> {
        if !(1..=10).contains(&max_depth) {
            return Err(EngineError::invalid("max_depth must be in [1,10]"));
        }
        let conn = self.conn.lock().unwrap();
        let root = query_service(&conn, "business_id", root_business_id)?
            .ok_or_else(|| EngineError::NotFound(format!("service '{root_business_id}' not found")))?;

        let mut visited: HashSet<Uuid> = HashSet::from([root.internal_id]);
        let mut nodes = vec![root.clone()];
        let mut edges: Vec<ServiceDependency> = Vec::new();
        let mut seen_edge_ids: HashSet<Uuid> = HashSet::new();
        let mut frontier = vec![root.internal_id];

        for _ in 0..max_depth {
            let mut next_frontier = Vec::new();
            for &node_id in &frontier {
                for edge in adjacent_edges(&conn, node_id, direction, include_stale)? {
                    if !seen_edge_ids.insert(edge.id) {
                        continue;
                    }
                    let neighbor = if edge.source_id == node_id {
                        edge.target_id
                    } else {
                        edge.source_id
                    };
                    edges.push(edge);
                    if visited.insert(neighbor) {
                        if let Some(svc) = query_service(&conn, "internal_id", &neighbor.to_string())? {
                            nodes.push(svc);
                        }
                        next_frontier.push(neighbor);
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        Ok((nodes, edges))
    }

    /// `source -> [targets]` over non-stale edges only, fed to the cycle
    /// detector.
    pub fn adjacency_snapshot(&self) -> Result<HashMap<Uuid, Vec<Uuid>>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT source_id, target_id FROM service_dependencies WHERE is_stale = 0")
            .map_err(EngineError::from)?;
        let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let rows = stmt
            .query_map([], |row| {
                let source: String = row.get(0)?;
                let target: String = row.get(1)?;
                Ok((source, target))
            })
            .map_err(EngineError::from)?;
        for row in rows {
            let (source, target) = row.map_err(EngineError::from)?;
            let source = parse_uuid(&source)?;
            let target = parse_uuid(&target)?;
            adjacency.entry(source).or_default().push(target);
        }
        Ok(adjacency)
    }

    /// Marks edges not observed within `threshold_hours` as stale.
    /// Idempotent: a second call with the same threshold marks nothing new.
    pub fn mark_stale(&self, threshold_hours: i64) -> Result<usize, EngineError> {
        let conn = self.conn.lock().unwrap();
        let cutoff = (Utc::now() - Duration::hours(threshold_hours)).to_rfc3339();
        let count = conn
            .execute(
                "UPDATE service_dependencies SET is_stale = 1 \
                 WHERE is_stale = 0 AND last_observed_at < ?1",
                params![cutoff],
            )
            .map_err(EngineError::from)?;
        Ok(count)
    }

    // ── Circular dependency alerts ──

    /// Runs the cycle detector (C2) over the current non-stale adjacency
    /// and records one open alert per distinct cycle found. This is the
    /// only supported way cycles get from the graph into
    /// `circular_dependency_alerts` — callers (the scheduler, or a manual
    /// trigger) do not call `adjacency_snapshot`/`detect_cycles` directly.
    pub fn detect_and_record_cycles(&self) -> Result<Vec<CircularDependencyAlert>, EngineError> {
        let adjacency = self.adjacency_snapshot()?;
        let sccs = crate::cycle_detector::detect_cycles(&adjacency);
        let mut alerts = Vec::with_capacity(sccs.len());
        for scc in sccs {
            let mut business_ids = Vec::with_capacity(scc.len());
            for internal_id in scc {
                let service = self.get_service_by_internal_id(internal_id)?.ok_or_else(|| {
                    EngineError::Fatal(format!("SCC member {internal_id} has no service row"))
                })?;
                business_ids.push(service.business_id);
            }
            alerts.push(self.record_cycle_alert(business_ids)?);
        }
        Ok(alerts)
    }

    /// Upserts one open alert per distinct cycle, keyed by the sorted set
    /// of member business ids, so re-detecting the same cycle doesn't
    /// duplicate alerts.
    pub fn record_cycle_alert(&self, cycle_business_ids: Vec<String>) -> Result<CircularDependencyAlert, EngineError> {
        let dedupe_key = CircularDependencyAlert::dedupe_key(&cycle_business_ids);
        let conn = self.conn.lock().unwrap();
        if let Some(existing) = query_alert(&conn, "dedupe_key", &dedupe_key)? {
            return Ok(existing);
        }
        let alert = CircularDependencyAlert::new(cycle_business_ids)?;
        insert_alert(&conn, &alert, &dedupe_key)?;
        Ok(alert)
    }

    pub fn get_alert(&self, id: Uuid) -> Result<Option<CircularDependencyAlert>, EngineError> {
        let conn = self.conn.lock().unwrap();
        query_alert(&conn, "id", &id.to_string())
    }

    pub fn list_alerts(&self, status_filter: Option<AlertStatus>) -> Result<Vec<CircularDependencyAlert>, EngineError> {
        let conn = self.conn.lock().unwrap();
        let sql = match status_filter {
            Some(_) => {
                "SELECT id, cycle_path, status, acknowledger, resolution_note, detected_at, \
                 acknowledged_at, resolved_at FROM circular_dependency_alerts WHERE status = ?1 \
                 ORDER BY detected_at DESC"
            }
            None => {
                "SELECT id, cycle_path, status, acknowledger, resolution_note, detected_at, \
                 acknowledged_at, resolved_at FROM circular_dependency_alerts ORDER BY detected_at DESC"
            }
        };
        let mut stmt = conn.prepare(sql).map_err(EngineError::from)?;
        let rows = match status_filter {
            Some(status) => stmt
                .query_map(params![alert_status_str(status)], row_to_alert)
                .map_err(EngineError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(EngineError::from)?,
            None => stmt
                .query_map([], row_to_alert)
                .map_err(EngineError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(EngineError::from)?,
        };
        Ok(rows)
    }

    pub fn acknowledge_alert(&self, id: Uuid, acknowledger: &str) -> Result<CircularDependencyAlert, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut alert = query_alert(&conn, "id", &id.to_string())?
            .ok_or_else(|| EngineError::NotFound(format!("alert {id} not found")))?;
        alert.acknowledge(acknowledger)?;
        update_alert(&conn, &alert)?;
        Ok(alert)
    }

    pub fn resolve_alert(&self, id: Uuid, note: &str) -> Result<CircularDependencyAlert, EngineError> {
        let conn = self.conn.lock().unwrap();
        let mut alert = query_alert(&conn, "id", &id.to_string())?
            .ok_or_else(|| EngineError::NotFound(format!("alert {id} not found")))?;
        alert.resolve(note)?;
        update_alert(&conn, &alert)?;
        Ok(alert)
    }
}

fn resolve_or_discover(conn: &Connection, business_id: &str) -> Result<Service, EngineError> {
    if let Some(service) = query_service(conn, "business_id", business_id)? {
        return Ok(service);
    }
    upsert_one_service(conn, &ServiceUpsert::discovered(business_id))
}

fn upsert_one_service(conn: &Connection, item: &ServiceUpsert) -> Result<Service, EngineError> {
    let existing = query_service(conn, "business_id", &item.business_id)?;
    let metadata_json = serde_json::to_string(&item.metadata).map_err(|e| EngineError::Fatal(e.to_string()))?;
    match existing {
        Some(existing) => {
            conn.execute(
                "UPDATE services SET criticality = ?2, owning_team = ?3, service_type = ?4, \
                 published_sla = ?5, metadata = ?6, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') \
                 WHERE internal_id = ?1",
                params![
                    existing.internal_id.to_string(),
                    criticality_str(item.criticality),
                    item.owning_team,
                    service_type_str(item.service_type),
                    item.published_sla,
                    metadata_json,
                ],
            )
            .map_err(EngineError::from)?;
        }
        None => {
            let internal_id = Uuid::new_v4();
            conn.execute(
                "INSERT INTO services (internal_id, business_id, criticality, owning_team, service_type, \
                 published_sla, metadata, discovered) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    internal_id.to_string(),
                    item.business_id,
                    criticality_str(item.criticality),
                    item.owning_team,
                    service_type_str(item.service_type),
                    item.published_sla,
                    metadata_json,
                    item.discovered as i64,
                ],
            )
            .map_err(EngineError::from)?;
        }
    }
    query_service(conn, "business_id", &item.business_id)?
        .ok_or_else(|| EngineError::Fatal("failed to read back upserted service".to_string()))
}

fn upsert_one_edge(
    conn: &Connection,
    item: &EdgeUpsert,
    source: Service,
    target: Service,
) -> Result<ServiceDependency, EngineError> {
    let existing: Option<Uuid> = conn
        .query_row(
            "SELECT id FROM service_dependencies WHERE source_id = ?1 AND target_id = ?2 AND discovery_source = ?3",
            params![
                source.internal_id.to_string(),
                target.internal_id.to_string(),
                discovery_source_str(item.discovery_source)
            ],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(EngineError::from)?
        .map(|s| parse_uuid(&s))
        .transpose()?;

    let now = Utc::now().to_rfc3339();
    let (max_attempts, backoff_ms) = item
        .retry_config
        .map(|r| (r.max_attempts, r.initial_backoff_ms))
        .unwrap_or((None, None));

    let id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE service_dependencies SET communication_mode = ?2, criticality = ?3, protocol = ?4, \
                 timeout_ms = ?5, retry_max_attempts = ?6, retry_initial_backoff_ms = ?7, confidence = ?8, \
                 last_observed_at = ?9, is_stale = 0 WHERE id = ?1",
                params![
                    id.to_string(),
                    communication_mode_str(item.communication_mode),
                    dependency_criticality_str(item.criticality),
                    item.protocol,
                    item.timeout_ms,
                    max_attempts,
                    backoff_ms,
                    item.confidence,
                    now,
                ],
            )
            .map_err(EngineError::from)?;
            id
        }
        None => {
            let id = Uuid::new_v4();
            conn.execute(
                "INSERT INTO service_dependencies (id, source_id, target_id, communication_mode, criticality, \
                 protocol, timeout_ms, retry_max_attempts, retry_initial_backoff_ms, discovery_source, \
                 confidence, last_observed_at, is_stale) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)",
                params![
                    id.to_string(),
                    source.internal_id.to_string(),
                    target.internal_id.to_string(),
                    communication_mode_str(item.communication_mode),
                    dependency_criticality_str(item.criticality),
                    item.protocol,
                    item.timeout_ms,
                    max_attempts,
                    backoff_ms,
                    discovery_source_str(item.discovery_source),
                    item.confidence,
                    now,
                ],
            )
            .map_err(EngineError::from)?;
            id
        }
    };

    query_edge_by_id(conn, id)?.ok_or_else(|| EngineError::Fatal("failed to read back upserted edge".to_string()))
}

fn adjacent_edges(
    conn: &Connection,
    node_id: Uuid,
    direction: TraversalDirection,
    include_stale: bool,
) -> Result<Vec<ServiceDependency>, EngineError> {
    let node = node_id.to_string();
    let stale_clause = if include_stale { "" } else { "AND is_stale = 0" };
    let sql = match direction {
        TraversalDirection::Downstream => format!(
            "{} WHERE source_id = ?1 {}",
            EDGE_SELECT, stale_clause
        ),
        TraversalDirection::Upstream => format!(
            "{} WHERE target_id = ?1 {}",
            EDGE_SELECT, stale_clause
        ),
        TraversalDirection::Both => format!(
            "{} WHERE (source_id = ?1 OR target_id = ?1) {}",
            EDGE_SELECT, stale_clause
        ),
    };
    let mut stmt = conn.prepare(&sql).map_err(EngineError::from)?;
    let rows = stmt
        .query_map(params![node], row_to_edge)
        .map_err(EngineError::from)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(EngineError::from)?;
    Ok(rows)
}

const EDGE_SELECT: &str = "SELECT id, source_id, target_id, communication_mode, criticality, protocol, \
     timeout_ms, retry_max_attempts, retry_initial_backoff_ms, discovery_source, confidence, \
     last_observed_at, is_stale FROM service_dependencies";

fn query_edge_by_id(conn: &Connection, id: Uuid) -> Result<Option<ServiceDependency>, EngineError> {
    let sql = format!("{EDGE_SELECT} WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], row_to_edge)
        .optional()
        .map_err(EngineError::from)
}

fn query_service(conn: &Connection, key_column: &str, value: &str) -> Result<Option<Service>, EngineError> {
    let sql = format!(
        "SELECT internal_id, business_id, criticality, owning_team, service_type, published_sla, \
         metadata, discovered, created_at, updated_at FROM services WHERE {key_column} = ?1"
    );
    conn.query_row(&sql, params![value], row_to_service)
        .optional()
        .map_err(EngineError::from)
}

fn query_alert(conn: &Connection, key_column: &str, value: &str) -> Result<Option<CircularDependencyAlert>, EngineError> {
    let sql = format!(
        "SELECT id, cycle_path, status, acknowledger, resolution_note, detected_at, acknowledged_at, \
         resolved_at FROM circular_dependency_alerts WHERE {key_column} = ?1"
    );
    conn.query_row(&sql, params![value], row_to_alert)
        .optional()
        .map_err(EngineError::from)
}

fn insert_alert(conn: &Connection, alert: &CircularDependencyAlert, dedupe_key: &str) -> Result<(), EngineError> {
    let cycle_path_json = serde_json::to_string(&alert.cycle_path).map_err(|e| EngineError::Fatal(e.to_string()))?;
    conn.execute(
        "INSERT INTO circular_dependency_alerts (id, cycle_path, dedupe_key, status, acknowledger, \
         resolution_note, detected_at, acknowledged_at, resolved_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            alert.id.to_string(),
            cycle_path_json,
            dedupe_key,
            alert_status_str(alert.status),
            alert.acknowledger,
            alert.resolution_note,
            alert.detected_at.to_rfc3339(),
            alert.acknowledged_at.map(|t| t.to_rfc3339()),
            alert.resolved_at.map(|t| t.to_rfc3339()),
        ],
    )
    .map_err(EngineError::from)?;
    Ok(())
}

fn update_alert(conn: &Connection, alert: &CircularDependencyAlert) -> Result<(), EngineError> {
    conn.execute(
        "UPDATE circular_dependency_alerts SET status = ?2, acknowledger = ?3, resolution_note = ?4, \
         acknowledged_at = ?5, resolved_at = ?6 WHERE id = ?1",
        params![
            alert.id.to_string(),
            alert_status_str(alert.status),
            alert.acknowledger,
            alert.resolution_note,
            alert.acknowledged_at.map(|t| t.to_rfc3339()),
            alert.resolved_at.map(|t| t.to_rfc3339()),
        ],
    )
    .map_err(EngineError::from)?;
    Ok(())
}

fn row_to_service(row: &rusqlite::Row) -> rusqlite::Result<Service> {
    let internal_id: String = row.get(0)?;
    let metadata_json: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(Service {
        internal_id: internal_id.parse().unwrap_or_default(),
        business_id: row.get(1)?,
        criticality: parse_criticality(&row.get::<_, String>(2)?),
        owning_team: row.get(3)?,
        service_type: parse_service_type(&row.get::<_, String>(4)?),
        published_sla: row.get(5)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        discovered: row.get::<_, i64>(7)? != 0,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<ServiceDependency> {
    let id: String = row.get(0)?;
    let source_id: String = row.get(1)?;
    let target_id: String = row.get(2)?;
    let retry_max_attempts: Option<u32> = row.get(7)?;
    let retry_initial_backoff_ms: Option<u64> = row.get(8)?;
    let retry_config = match (retry_max_attempts, retry_initial_backoff_ms) {
        (None, None) => None,
        (max_attempts, initial_backoff_ms) => Some(RetryConfig { max_attempts, initial_backoff_ms }),
    };
    let last_observed_at: String = row.get(11)?;
    Ok(ServiceDependency {
        id: id.parse().unwrap_or_default(),
        source_id: source_id.parse().unwrap_or_default(),
        target_id: target_id.parse().unwrap_or_default(),
        communication_mode: parse_communication_mode(&row.get::<_, String>(3)?),
        criticality: parse_dependency_criticality(&row.get::<_, String>(4)?),
        protocol: row.get(5)?,
        timeout_ms: row.get(6)?,
        retry_config,
        discovery_source: parse_discovery_source(&row.get::<_, String>(9)?),
        confidence: row.get(10)?,
        last_observed_at: parse_datetime(&last_observed_at),
        is_stale: row.get::<_, i64>(12)? != 0,
    })
}

fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<CircularDependencyAlert> {
    let id: String = row.get(0)?;
    let cycle_path_json: String = row.get(1)?;
    let detected_at: String = row.get(5)?;
    let acknowledged_at: Option<String> = row.get(6)?;
    let resolved_at: Option<String> = row.get(7)?;
    Ok(CircularDependencyAlert {
        id: id.parse().unwrap_or_default(),
        cycle_path: serde_json::from_str(&cycle_path_json).unwrap_or_default(),
        status: parse_alert_status(&row.get::<_, String>(2)?),
        acknowledger: row.get(3)?,
        resolution_note: row.get(4)?,
        detected_at: parse_datetime(&detected_at),
        acknowledged_at: acknowledged_at.map(|s| parse_datetime(&s)),
        resolved_at: resolved_at.map(|s| parse_datetime(&s)),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

fn parse_uuid(s: &str) -> Result<Uuid, EngineError> {
    s.parse().map_err(|_| EngineError::Fatal(format!("invalid uuid stored: {s}")))
}

fn criticality_str(c: Criticality) -> &'static str {
    match c {
        Criticality::Critical => "critical",
        Criticality::High => "high",
        Criticality::Medium => "medium",
        Criticality::Low => "low",
    }
}
fn parse_criticality(s: &str) -> Criticality {
    match s {
        "critical" => Criticality::Critical,
        "high" => Criticality::High,
        "low" => Criticality::Low,
        _ => Criticality::Medium,
    }
}

fn service_type_str(t: ServiceType) -> &'static str {
    match t {
        ServiceType::Internal => "internal",
        ServiceType::External => "external",
    }
}
fn parse_service_type(s: &str) -> ServiceType {
    match s {
        "external" => ServiceType::External,
        _ => ServiceType::Internal,
    }
}

fn communication_mode_str(m: CommunicationMode) -> &'static str {
    match m {
        CommunicationMode::Sync => "sync",
        CommunicationMode::Async => "async",
    }
}
fn parse_communication_mode(s: &str) -> CommunicationMode {
    match s {
        "async" => CommunicationMode::Async,
        _ => CommunicationMode::Sync,
    }
}

fn dependency_criticality_str(c: DependencyCriticality) -> &'static str {
    match c {
        DependencyCriticality::Hard => "hard",
        DependencyCriticality::Soft => "soft",
        DependencyCriticality::Degraded => "degraded",
    }
}
fn parse_dependency_criticality(s: &str) -> DependencyCriticality {
    match s {
        "soft" => DependencyCriticality::Soft,
        "degraded" => DependencyCriticality::Degraded,
        _ => DependencyCriticality::Hard,
    }
}

fn discovery_source_str(s: DiscoverySource) -> &'static str {
    match s {
        DiscoverySource::Manual => "manual",
        DiscoverySource::OtelServiceGraph => "otel_service_graph",
        DiscoverySource::Kubernetes => "kubernetes",
        DiscoverySource::ServiceMesh => "service_mesh",
    }
}
fn parse_discovery_source(s: &str) -> DiscoverySource {
    match s {
        "otel_service_graph" => DiscoverySource::OtelServiceGraph,
        "kubernetes" => DiscoverySource::Kubernetes,
        "service_mesh" => DiscoverySource::ServiceMesh,
        _ => DiscoverySource::Manual,
    }
}

fn alert_status_str(s: AlertStatus) -> &'static str {
    match s {
        AlertStatus::Open => "open",
        AlertStatus::Acknowledged => "acknowledged",
        AlertStatus::Resolved => "resolved",
    }
}
fn parse_alert_status(s: &str) -> AlertStatus {
    match s {
        "acknowledged" => AlertStatus::Acknowledged,
        "resolved" => AlertStatus::Resolved,
        _ => AlertStatus::Open,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_service(business_id: &str) -> ServiceUpsert {
        ServiceUpsert {
            business_id: business_id.to_string(),
            criticality: Criticality::High,
            owning_team: Some("payments".to_string()),
            service_type: ServiceType::Internal,
            published_sla: None,
            metadata: Default::default(),
            discovered: false,
        }
    }

    fn sample_edge(source: &str, target: &str) -> EdgeUpsert {
        EdgeUpsert {
            source_business_id: source.to_string(),
            target_business_id: target.to_string(),
            communication_mode: CommunicationMode::Sync,
            criticality: DependencyCriticality::Hard,
            protocol: Some("grpc".to_string()),
            timeout_ms: Some(500),
            retry_config: None,
            discovery_source: DiscoverySource::Manual,
            confidence: 0.95,
        }
    }

    #[test]
    fn upsert_services_is_idempotent_on_business_id() {
        let store = GraphStore::open_in_memory().unwrap();
        let batch = vec![sample_service("checkout")];
        let first = store.upsert_services(&batch).unwrap();
        let second = store.upsert_services(&batch).unwrap();
        assert_eq!(first[0].internal_id, second[0].internal_id);
        assert_eq!(store.list_services(0, 100).unwrap().len(), 1);
    }

    #[test]
    fn upsert_edges_auto_discovers_unknown_endpoints() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_services(&[sample_service("checkout")]).unwrap();
        let edges = store.upsert_edges(&[sample_edge("checkout", "payments-gateway")]).unwrap();
        assert_eq!(edges.len(), 1);
        let target = store.get_service("payments-gateway").unwrap().unwrap();
        assert!(target.discovered);
        assert_eq!(target.metadata.get("source").map(String::as_str), Some("auto_discovered"));
    }

    #[test]
    fn traverse_downstream_is_cycle_safe() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .upsert_services(&[sample_service("a"), sample_service("b"), sample_service("c")])
            .unwrap();
        store
            .upsert_edges(&[sample_edge("a", "b"), sample_edge("b", "c"), sample_edge("c", "a")])
            .unwrap();

        let (nodes, edges) = store.traverse("a", TraversalDirection::Downstream, 5, false).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(edges.len(), 3);
    }

    #[test]
    fn mark_stale_is_idempotent() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_services(&[sample_service("a"), sample_service("b")]).unwrap();
        store.upsert_edges(&[sample_edge("a", "b")]).unwrap();

        // Force last_observed_at into the past directly.
        {
            let conn = store.conn.lock().unwrap();
            conn.execute("UPDATE service_dependencies SET last_observed_at = '2000-01-01T00:00:00Z'", [])
                .unwrap();
        }

        let first = store.mark_stale(168).unwrap();
        let second = store.mark_stale(168).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[test]
    fn adjacency_snapshot_excludes_stale_edges() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_services(&[sample_service("a"), sample_service("b")]).unwrap();
        store.upsert_edges(&[sample_edge("a", "b")]).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute("UPDATE service_dependencies SET is_stale = 1", []).unwrap();
        }
        let snapshot = store.adjacency_snapshot().unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn detect_and_record_cycles_finds_a_live_cycle_and_dedupes_on_rerun() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .upsert_services(&[sample_service("a"), sample_service("b"), sample_service("c"), sample_service("d")])
            .unwrap();
        store
            .upsert_edges(&[
                sample_edge("a", "b"),
                sample_edge("b", "c"),
                sample_edge("c", "a"),
                sample_edge("c", "d"),
            ])
            .unwrap();

        let alerts = store.detect_and_record_cycles().unwrap();
        assert_eq!(alerts.len(), 1);
        let mut members = alerts[0].cycle_path.clone();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string(), "c".to_string()]);

        let rerun = store.detect_and_record_cycles().unwrap();
        assert_eq!(rerun.len(), 1);
        assert_eq!(rerun[0].id, alerts[0].id);
        assert_eq!(store.list_alerts(None).unwrap().len(), 1);
    }

    #[test]
    fn record_cycle_alert_dedupes_repeated_detections() {
        let store = GraphStore::open_in_memory().unwrap();
        let cycle = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let first = store.record_cycle_alert(cycle.clone()).unwrap();
        let second = store.record_cycle_alert(vec!["c".to_string(), "a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_alerts(None).unwrap().len(), 1);
    }

    #[test]
    fn alert_lifecycle_transitions() {
        let store = GraphStore::open_in_memory().unwrap();
        let alert = store.record_cycle_alert(vec!["a".to_string(), "b".to_string()]).unwrap();
        let acked = store.acknowledge_alert(alert.id, "oncall").unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        let resolved = store.resolve_alert(alert.id, "broke the cycle").unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(store.acknowledge_alert(resolved.id, "someone").is_err());
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("graph.db");
        let db_path = db_path.to_str().unwrap();

        {
            let store = GraphStore::open(db_path).unwrap();
            store.upsert_services(&[sample_service("checkout")]).unwrap();
        }

        let reopened = GraphStore::open(db_path).unwrap();
        assert!(reopened.get_service("checkout").unwrap().is_some());
    }
}

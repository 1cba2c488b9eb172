//! SQLite-backed event and identity store.
//!
//! Every public operation takes the store-wide lock once and runs to
//! completion under it, so concurrent workers never interleave statements.
//! Multi-statement operations additionally run inside one transaction.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use vigil_models::{
    AttendanceEntry, BoundingBox, Embedding, Event, EventType, FaceType, IdentitySummary,
    NewEvent, StoredSample, UnknownCluster,
};

use crate::error::{DbError, DbResult};
use crate::schema::SCHEMA;

/// Result of [`EventStore::register`].
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub identity_id: i64,
    pub name: String,
    /// False when the embedding was added as a sample of an existing name.
    pub created: bool,
}

/// Decision returned by the caller of [`EventStore::assign_unknown`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClusterChoice {
    /// Fold the observation into this existing cluster.
    Join { cluster_id: i64, score: f32 },
    /// Seed a new cluster; `nearest_score` is the best rejected similarity.
    Create { nearest_score: Option<f32> },
}

/// Result of an unknown-cluster assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownAssignment {
    /// Cluster state after the update
    pub cluster: UnknownCluster,
    /// Similarity that decided the assignment, if any cluster was compared
    pub score: Option<f32>,
    pub created: bool,
}

/// Durable event log plus identity and unknown-cluster tables.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened event store");
        Self::with_connection(conn)
    }

    /// Store that lives only as long as the process.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ========================================================================
    // Identities
    // ========================================================================

    /// Attach an auxiliary sample to an existing identity.
    pub fn add_sample(&self, identity_id: i64, embedding: &Embedding) -> DbResult<i64> {
        validate_embedding(embedding)?;
        let conn = self.conn.lock();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM identities WHERE id = ?",
                [identity_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(DbError::not_found(format!("identity {}", identity_id)));
        }
        insert_sample(&conn, identity_id, embedding)
    }

    /// Register `embedding` under `name`.
    ///
    /// If an identity with exactly this (trimmed) name exists, the embedding
    /// becomes an auxiliary sample of the oldest such identity; otherwise a
    /// new identity is created.
    pub fn register(&self, name: &str, embedding: &Embedding) -> DbResult<Registration> {
        let name = validate_name(name)?;
        validate_embedding(embedding)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM identities WHERE name = ? ORDER BY id ASC LIMIT 1",
                [&name],
                |row| row.get(0),
            )
            .optional()?;

        let registration = match existing {
            Some(identity_id) => {
                insert_sample(&tx, identity_id, embedding)?;
                Registration {
                    identity_id,
                    name,
                    created: false,
                }
            }
            None => {
                let identity_id = insert_identity(&tx, &name, embedding)?;
                Registration {
                    identity_id,
                    name,
                    created: true,
                }
            }
        };
        tx.commit()?;

        info!(
            identity_id = registration.identity_id,
            name = %registration.name,
            created = registration.created,
            "Registered face"
        );
        Ok(registration)
    }

    /// Registered identities, newest first.
    pub fn list_identities(&self) -> DbResult<Vec<IdentitySummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT i.id, i.name, i.created_at,
                   1 + (SELECT COUNT(*) FROM identity_samples s WHERE s.identity_id = i.id)
            FROM identities i
            ORDER BY i.id DESC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IdentitySummary {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: parse_ts(row, 2)?,
                samples: row.get::<_, i64>(3)? as u32,
            })
        })?;
        let collected = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(collected)
    }

    /// Every usable embedding sample across all identities.
    ///
    /// Canonical embeddings come first, then auxiliary samples, each in
    /// insertion order. Rows whose blob length disagrees with their
    /// recorded dimension are skipped.
    pub fn known_samples(&self) -> DbResult<Vec<StoredSample>> {
        let conn = self.conn.lock();
        let mut out = Vec::new();

        let mut stmt = conn.prepare("SELECT id, name, embedding, dim FROM identities ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        for row in rows {
            let (id, name, blob, dim) = row?;
            if let Some(embedding) = decode_embedding("identities", id, &blob, dim) {
                out.push(StoredSample {
                    identity_id: id,
                    name,
                    embedding,
                    canonical: true,
                });
            }
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT s.id, s.identity_id, i.name, s.embedding, s.dim
            FROM identity_samples s
            JOIN identities i ON i.id = s.identity_id
            ORDER BY s.id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;
        for row in rows {
            let (sample_id, identity_id, name, blob, dim) = row?;
            if let Some(embedding) = decode_embedding("identity_samples", sample_id, &blob, dim) {
                out.push(StoredSample {
                    identity_id,
                    name,
                    embedding,
                    canonical: false,
                });
            }
        }

        Ok(out)
    }

    // ========================================================================
    // Unknown clusters
    // ========================================================================

    /// All usable unknown clusters in id order.
    pub fn unknown_clusters(&self) -> DbResult<Vec<UnknownCluster>> {
        let conn = self.conn.lock();
        load_clusters(&conn)
    }

    /// Assign an unmatched face to an unknown cluster in one atomic step.
    ///
    /// `choose` sees the current valid clusters and decides whether the
    /// observation joins one of them or seeds a new one. Joining replaces
    /// the cluster's embedding with `embedding`, bumps `last_seen` and
    /// increments `sightings`. The whole read-decide-write sequence holds
    /// the store lock, so two concurrent callers cannot both create a
    /// cluster for the same face.
    pub fn assign_unknown<F>(&self, embedding: &Embedding, choose: F) -> DbResult<UnknownAssignment>
    where
        F: FnOnce(&[UnknownCluster]) -> ClusterChoice,
    {
        validate_embedding(embedding)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let clusters = load_clusters(&tx)?;
        let now = now_ts();

        let (cluster_id, score, created) = match choose(&clusters) {
            ClusterChoice::Join { cluster_id, score } => {
                let updated = tx.execute(
                    r#"
                    UPDATE unknown_clusters
                    SET embedding = ?, dim = ?, last_seen = ?, sightings = sightings + 1
                    WHERE id = ?
                    "#,
                    params![
                        embedding.to_le_bytes(),
                        embedding.dim() as i64,
                        now,
                        cluster_id
                    ],
                )?;
                if updated == 0 {
                    return Err(DbError::not_found(format!("unknown cluster {}", cluster_id)));
                }
                (cluster_id, Some(score), false)
            }
            ClusterChoice::Create { nearest_score } => {
                tx.execute(
                    r#"
                    INSERT INTO unknown_clusters (embedding, dim, first_seen, last_seen, sightings)
                    VALUES (?, ?, ?, ?, 1)
                    "#,
                    params![embedding.to_le_bytes(), embedding.dim() as i64, now, now],
                )?;
                (tx.last_insert_rowid(), nearest_score, true)
            }
        };

        let cluster = tx.query_row(
            "SELECT id, embedding, dim, first_seen, last_seen, sightings FROM unknown_clusters WHERE id = ?",
            [cluster_id],
            cluster_from_row,
        )?;
        tx.commit()?;

        let (id, blob, dim, first_seen, last_seen, sightings) = cluster;
        let embedding = decode_embedding("unknown_clusters", id, &blob, dim)
            .ok_or_else(|| DbError::corrupt(format!("unknown cluster {} after write", id)))?;

        debug!(cluster_id = id, sightings, created, "Assigned unknown face");
        Ok(UnknownAssignment {
            cluster: UnknownCluster {
                id,
                embedding,
                first_seen,
                last_seen,
                sightings,
            },
            score,
            created,
        })
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Append an event; returns it with its assigned id and timestamp.
    pub fn append_event(&self, event: &NewEvent) -> DbResult<Event> {
        let bbox_json = event
            .bbox
            .map(|b| serde_json::to_string(&b))
            .transpose()
            .map_err(|e| DbError::invalid_input(e.to_string()))?;
        let created_at = Utc::now();

        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO events (event_type, face_type, face_id, name, score, bbox_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                event.event_type.as_str(),
                event.face_type.as_str(),
                event.face_id,
                event.name,
                event.score.map(|s| s as f64),
                bbox_json,
                format_ts(&created_at),
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Event {
            id,
            event_type: event.event_type,
            face_type: event.face_type,
            face_id: event.face_id,
            name: event.name.clone(),
            score: event.score,
            bbox: event.bbox,
            created_at,
        })
    }

    /// The `limit` most recent events, newest first.
    pub fn recent_events(&self, limit: usize) -> DbResult<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, event_type, face_type, face_id, name, score, bbox_json, created_at
            FROM events
            ORDER BY id DESC
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map([limit as i64], event_from_row)?;
        let collected = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(collected)
    }

    /// Known-face sightings grouped by name, most recently seen first.
    pub fn attendance(&self, limit: usize) -> DbResult<Vec<AttendanceEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT name, COUNT(*) AS total, MAX(created_at) AS last_seen
            FROM events
            WHERE event_type = ? AND face_type = ? AND name IS NOT NULL
            GROUP BY name
            ORDER BY last_seen DESC
            LIMIT ?
            "#,
        )?;
        let rows = stmt.query_map(
            params![
                EventType::FaceRecognized.as_str(),
                FaceType::Known.as_str(),
                limit as i64
            ],
            |row| {
                Ok(AttendanceEntry {
                    name: row.get(0)?,
                    total: row.get::<_, i64>(1)? as u32,
                    last_seen: parse_ts(row, 2)?,
                })
            },
        )?;
        let collected = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(collected)
    }
}

fn validate_name(name: &str) -> DbResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DbError::invalid_input("name must not be empty"));
    }
    Ok(name.to_string())
}

fn validate_embedding(embedding: &Embedding) -> DbResult<()> {
    if embedding.is_empty() {
        return Err(DbError::invalid_input("embedding must not be empty"));
    }
    if embedding.as_slice().iter().any(|v| !v.is_finite()) {
        return Err(DbError::invalid_input("embedding contains non-finite values"));
    }
    Ok(())
}

fn insert_identity(conn: &Connection, name: &str, embedding: &Embedding) -> DbResult<i64> {
    conn.execute(
        "INSERT INTO identities (name, embedding, dim, created_at) VALUES (?, ?, ?, ?)",
        params![name, embedding.to_le_bytes(), embedding.dim() as i64, now_ts()],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_sample(conn: &Connection, identity_id: i64, embedding: &Embedding) -> DbResult<i64> {
    conn.execute(
        "INSERT INTO identity_samples (identity_id, embedding, dim, created_at) VALUES (?, ?, ?, ?)",
        params![identity_id, embedding.to_le_bytes(), embedding.dim() as i64, now_ts()],
    )?;
    Ok(conn.last_insert_rowid())
}

type ClusterRow = (i64, Vec<u8>, i64, DateTime<Utc>, DateTime<Utc>, u32);

fn cluster_from_row(row: &Row<'_>) -> rusqlite::Result<ClusterRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        parse_ts(row, 3)?,
        parse_ts(row, 4)?,
        row.get::<_, i64>(5)? as u32,
    ))
}

fn load_clusters(conn: &Connection) -> DbResult<Vec<UnknownCluster>> {
    let mut stmt = conn.prepare(
        "SELECT id, embedding, dim, first_seen, last_seen, sightings FROM unknown_clusters ORDER BY id",
    )?;
    let rows = stmt.query_map([], cluster_from_row)?;

    let mut clusters = Vec::new();
    for row in rows {
        let (id, blob, dim, first_seen, last_seen, sightings) = row?;
        if let Some(embedding) = decode_embedding("unknown_clusters", id, &blob, dim) {
            clusters.push(UnknownCluster {
                id,
                embedding,
                first_seen,
                last_seen,
                sightings,
            });
        }
    }
    Ok(clusters)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let event_type: String = row.get(1)?;
    let face_type: String = row.get(2)?;
    let bbox_json: Option<String> = row.get(6)?;

    Ok(Event {
        id: row.get(0)?,
        event_type: event_type
            .parse()
            .map_err(|e| conversion_error(1, e))?,
        face_type: face_type
            .parse()
            .map_err(|e| conversion_error(2, e))?,
        face_id: row.get(3)?,
        name: row.get(4)?,
        score: row.get::<_, Option<f64>>(5)?.map(|s| s as f32),
        bbox: bbox_json.and_then(|s| serde_json::from_str::<BoundingBox>(&s).ok()),
        created_at: parse_ts(row, 7)?,
    })
}

/// Decode a stored embedding, dropping rows that fail the dimension check.
fn decode_embedding(table: &str, id: i64, blob: &[u8], dim: i64) -> Option<Embedding> {
    let decoded = usize::try_from(dim)
        .ok()
        .and_then(|dim| Embedding::from_le_bytes(blob, dim));
    if decoded.is_none() {
        info!(
            table,
            id,
            dim,
            bytes = blob.len(),
            "Skipping embedding whose length disagrees with its dimension"
        );
    }
    decoded
}

fn now_ts() -> String {
    format_ts(&Utc::now())
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

//! Face identity resolution and greedy unknown-face clustering.
//!
//! Matching is a linear scan over every stored embedding, known samples
//! and unknown representatives alike. That is fine for a household-sized
//! gallery; there is no index.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use vigil_db::{ClusterChoice, EventStore, UnknownAssignment};
use vigil_models::{
    BoundingBox, Embedding, Event, FaceObservation, IdentityMatch, NewEvent, StoredSample,
    UnknownCluster,
};

use crate::error::PerceptionResult;
use crate::metrics;

/// Known matches kept per face.
pub const MAX_KNOWN_MATCHES: usize = 3;

/// How one face was resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// At least one registered identity scored at or above the known threshold.
    Known {
        best: IdentityMatch,
        /// Up to three matches, best first
        matches: Vec<IdentityMatch>,
    },
    /// Assigned to an unknown cluster (possibly a new one).
    Unknown {
        cluster_id: i64,
        name: String,
        /// Similarity to the joined cluster, or to the nearest rejected one
        score: Option<f32>,
        sightings: u32,
        created: bool,
    },
}

impl Resolution {
    pub fn known_match(&self) -> Option<&IdentityMatch> {
        match self {
            Resolution::Known { best, .. } => Some(best),
            Resolution::Unknown { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Resolution::Known { best, .. } => &best.name,
            Resolution::Unknown { name, .. } => name,
        }
    }

    /// Timeline event for this resolution.
    pub fn to_event(&self, bbox: BoundingBox) -> NewEvent {
        match self {
            Resolution::Known { best, .. } => {
                NewEvent::known_face(best.id, best.name.clone(), best.score, bbox)
            }
            Resolution::Unknown {
                cluster_id,
                name,
                score,
                ..
            } => NewEvent::unknown_face(*cluster_id, name.clone(), *score, bbox),
        }
    }
}

/// One resolved face with its box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceResolution {
    pub bbox: BoundingBox,
    #[serde(flatten)]
    pub resolution: Resolution,
}

/// Resolves face embeddings against the identity store.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<EventStore>,
    known_threshold: f32,
    unknown_threshold: f32,
}

impl IdentityResolver {
    pub fn new(store: Arc<EventStore>, known_threshold: f32, unknown_threshold: f32) -> Self {
        Self {
            store,
            known_threshold,
            unknown_threshold,
        }
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn known_threshold(&self) -> f32 {
        self.known_threshold
    }

    /// Stored samples scoring at or above the known threshold, best first, at most three.
    ///
    /// Every sample is scored on its own, so an identity with several close
    /// samples can fill more than one place.
    pub fn match_known(&self, embedding: &Embedding) -> PerceptionResult<Vec<IdentityMatch>> {
        let samples = self.store.known_samples()?;
        Ok(rank_known(embedding, &samples, self.known_threshold))
    }

    /// Resolve one face: known identity if any clears the threshold, else
    /// join or seed an unknown cluster.
    pub fn resolve(&self, embedding: &Embedding) -> PerceptionResult<Resolution> {
        let matches = self.match_known(embedding)?;
        if let Some(best) = matches.first().cloned() {
            debug!(identity_id = best.id, score = best.score, "Known face");
            return Ok(Resolution::Known { best, matches });
        }

        let threshold = self.unknown_threshold;
        let assignment = self
            .store
            .assign_unknown(embedding, |clusters| choose_cluster(embedding, clusters, threshold))?;
        Ok(unknown_resolution(assignment))
    }

    /// Resolve a face and append its `face_recognized` event.
    pub fn resolve_and_record(
        &self,
        face: &FaceObservation,
    ) -> PerceptionResult<(FaceResolution, Event)> {
        let resolution = self.resolve(&face.embedding)?;
        let event = self.store.append_event(&resolution.to_event(face.bbox))?;
        metrics::record_event(event.event_type.as_str());
        Ok((
            FaceResolution {
                bbox: face.bbox,
                resolution,
            },
            event,
        ))
    }
}

fn rank_known(embedding: &Embedding, samples: &[StoredSample], threshold: f32) -> Vec<IdentityMatch> {
    let mut matches: Vec<IdentityMatch> = samples
        .iter()
        .filter_map(|sample| {
            let score = embedding.cosine_similarity(&sample.embedding)?;
            (score >= threshold).then(|| IdentityMatch {
                id: sample.identity_id,
                name: sample.name.clone(),
                score,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(MAX_KNOWN_MATCHES);
    matches
}

/// Nearest cluster wins if it clears `threshold`; ties keep the lower id.
fn choose_cluster(embedding: &Embedding, clusters: &[UnknownCluster], threshold: f32) -> ClusterChoice {
    let nearest = clusters
        .iter()
        .filter_map(|c| embedding.cosine_similarity(&c.embedding).map(|s| (c.id, s)))
        .fold(None, |best: Option<(i64, f32)>, (id, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((id, score)),
        });

    match nearest {
        Some((cluster_id, score)) if score >= threshold => ClusterChoice::Join { cluster_id, score },
        Some((_, score)) => ClusterChoice::Create {
            nearest_score: Some(score),
        },
        None => ClusterChoice::Create {
            nearest_score: None,
        },
    }
}

fn unknown_resolution(assignment: UnknownAssignment) -> Resolution {
    let cluster = assignment.cluster;
    Resolution::Unknown {
        cluster_id: cluster.id,
        name: UnknownCluster::display_name(cluster.id),
        score: assignment.score,
        sightings: cluster.sightings,
        created: assignment.created,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn e(v: &[f32]) -> Embedding {
        Embedding::new(v.to_vec())
    }

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(Arc::new(EventStore::open_in_memory().unwrap()), 0.45, 0.5)
    }

    fn sample(id: i64, name: &str, v: &[f32]) -> StoredSample {
        StoredSample {
            identity_id: id,
            name: name.to_string(),
            embedding: e(v),
            canonical: true,
        }
    }

    #[test]
    fn test_rank_known_sorts_and_limits() {
        let samples = vec![
            sample(2, "bob", &[0.8, 0.2]),
            sample(1, "alice", &[1.0, 0.0]),
            sample(1, "alice", &[0.9, 0.1]),
            sample(3, "carol", &[0.7, 0.3]),
            sample(5, "erin", &[0.0, 1.0]),
            sample(6, "short", &[1.0]),
        ];
        let ranked = rank_known(&e(&[1.0, 0.0]), &samples, 0.45);
        let ids: Vec<_> = ranked.iter().map(|m| m.id).collect();
        assert_eq!(ids, [1, 1, 2]);
        assert!((ranked[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let samples = vec![sample(1, "alice", &[1.0, 0.0])];
        let probe = e(&[0.6, 0.8]);
        let score = probe.cosine_similarity(&samples[0].embedding).unwrap();
        assert_eq!(rank_known(&probe, &samples, score).len(), 1);
        assert!(rank_known(&probe, &samples, score + 1e-3).is_empty());
    }

    #[test]
    fn test_choose_cluster_prefers_nearest() {
        let now = Utc::now();
        let cluster = |id, v: &[f32]| UnknownCluster {
            id,
            embedding: e(v),
            first_seen: now,
            last_seen: now,
            sightings: 1,
        };
        let clusters = vec![cluster(1, &[0.0, 1.0]), cluster(2, &[1.0, 0.1])];
        match choose_cluster(&e(&[1.0, 0.0]), &clusters, 0.5) {
            ClusterChoice::Join { cluster_id, .. } => assert_eq!(cluster_id, 2),
            other => panic!("expected join, got {other:?}"),
        }
        match choose_cluster(&e(&[-1.0, 0.0]), &clusters, 0.5) {
            ClusterChoice::Create { nearest_score } => assert!(nearest_score.unwrap() < 0.5),
            other => panic!("expected create, got {other:?}"),
        }
        assert_eq!(
            choose_cluster(&e(&[1.0, 0.0]), &[], 0.5),
            ClusterChoice::Create {
                nearest_score: None
            }
        );
    }

    #[test]
    fn test_known_match_never_touches_clusters() {
        let resolver = resolver();
        resolver.store().register("Alice", &e(&[1.0, 0.0, 0.0])).unwrap();

        let resolution = resolver.resolve(&e(&[0.9, 0.1, 0.0])).unwrap();
        assert_eq!(resolution.known_match().unwrap().name, "Alice");
        assert!(resolver.store().unknown_clusters().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_face_seeds_then_joins_cluster() {
        let resolver = resolver();
        resolver.store().register("Alice", &e(&[1.0, 0.0, 0.0])).unwrap();

        let first = resolver.resolve(&e(&[0.0, 1.0, 0.0])).unwrap();
        let cluster_id = match &first {
            Resolution::Unknown {
                cluster_id,
                sightings,
                created,
                name,
                ..
            } => {
                assert!(*created);
                assert_eq!(*sightings, 1);
                assert_eq!(name, &format!("Unknown #{}", cluster_id));
                *cluster_id
            }
            other => panic!("expected unknown, got {other:?}"),
        };

        let second = resolver.resolve(&e(&[0.0, 0.95, 0.05])).unwrap();
        match second {
            Resolution::Unknown {
                cluster_id: again,
                sightings,
                created,
                score,
                ..
            } => {
                assert_eq!(again, cluster_id);
                assert_eq!(sightings, 2);
                assert!(!created);
                assert!(score.unwrap() > 0.9);
            }
            other => panic!("expected unknown, got {other:?}"),
        }
        assert_eq!(resolver.store().unknown_clusters().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_rows_never_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.db");
        let store = Arc::new(EventStore::open(&path).unwrap());
        let resolver = IdentityResolver::new(Arc::clone(&store), 0.45, 0.5);

        // Rows whose blob disagrees with the recorded dimension
        let now = Utc::now().to_rfc3339();
        let blob = e(&[0.0, 0.0, 1.0]).to_le_bytes();
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO identities (name, embedding, dim, created_at) VALUES ('Mallory', ?1, 4, ?2)",
            rusqlite::params![blob, now],
        )
        .unwrap();
        let mallory = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO identity_samples (identity_id, embedding, dim, created_at) VALUES (?1, ?2, 2, ?3)",
            rusqlite::params![mallory, blob, now],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO unknown_clusters (embedding, dim, first_seen, last_seen, sightings) VALUES (?1, 5, ?2, ?2, 7)",
            rusqlite::params![blob, now],
        )
        .unwrap();
        let corrupt_cluster = conn.last_insert_rowid();
        drop(conn);

        match resolver.resolve(&e(&[0.0, 0.0, 1.0])).unwrap() {
            Resolution::Unknown {
                cluster_id,
                created,
                sightings,
                score,
                ..
            } => {
                assert_ne!(cluster_id, corrupt_cluster);
                assert!(created);
                assert_eq!(sightings, 1);
                assert_eq!(score, None);
            }
            other => panic!("corrupt row matched: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_and_record_appends_event() {
        let resolver = resolver();
        let face = FaceObservation::new(BoundingBox::new(1, 2, 3, 4), e(&[0.3, 0.3, 0.9]));
        let (resolved, event) = resolver.resolve_and_record(&face).unwrap();
        assert_eq!(resolved.bbox, face.bbox);
        assert_eq!(event.bbox, Some(face.bbox));
        assert_eq!(event.face_type, vigil_models::FaceType::Unknown);
        assert_eq!(resolver.store().recent_events(10).unwrap().len(), 1);
    }
}

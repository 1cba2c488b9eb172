//! Periodic face identification.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;
use vigil_models::{FailureCode, FrameVariant, IdentityMatch, PERSON_LABEL};

use crate::collaborators::FaceAnalyzer;
use crate::error::{PerceptionError, PerceptionResult};
use crate::frame_store::FrameStore;
use crate::resolver::{FaceResolution, IdentityResolver};
use crate::worker::{Perception, StopSignal, TickOutcome};

/// Every face seen in one tick plus the best known match among them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceTick {
    pub faces: Vec<FaceResolution>,
    /// Highest-scoring known match across all faces; `None` for unknown-only ticks
    pub best: Option<IdentityMatch>,
}

impl FaceTick {
    pub fn new(faces: Vec<FaceResolution>) -> Self {
        let best = faces
            .iter()
            .filter_map(|f| f.resolution.known_match())
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .cloned();
        Self { faces, best }
    }
}

pub struct FacePerception {
    analyzer: Arc<dyn FaceAnalyzer>,
    resolver: IdentityResolver,
    frames: Arc<FrameStore>,
    interval: Duration,
}

impl FacePerception {
    pub fn new(
        analyzer: Arc<dyn FaceAnalyzer>,
        resolver: IdentityResolver,
        frames: Arc<FrameStore>,
        interval: Duration,
    ) -> Self {
        Self {
            analyzer,
            resolver,
            frames,
            interval,
        }
    }

    fn identify(&self) -> PerceptionResult<Option<FaceTick>> {
        let Some(frame) = self.frames.frame(FrameVariant::Raw) else {
            return Err(PerceptionError::NoFrame);
        };
        let faces = self.analyzer.faces(&frame)?;
        if faces.is_empty() {
            return Ok(None);
        }

        let mut resolved = Vec::with_capacity(faces.len());
        for face in &faces {
            let (resolution, event) = self.resolver.resolve_and_record(face)?;
            debug!(event_id = event.id, name = resolution.resolution.name(), "Face resolved");
            resolved.push(resolution);
        }
        Ok(Some(FaceTick::new(resolved)))
    }
}

impl Perception for FacePerception {
    type Output = FaceTick;

    fn name(&self) -> &'static str {
        "face"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn gate(&self) -> bool {
        self.frames.has_label(PERSON_LABEL)
    }

    fn tick(&mut self, _stop: &StopSignal) -> TickOutcome<FaceTick> {
        match self.identify() {
            Ok(Some(tick)) => TickOutcome::ok(tick),
            Ok(None) => TickOutcome::failed(FailureCode::NoFace, "no face in frame"),
            Err(e) => TickOutcome::failed(e.failure_code(), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Resolution;
    use chrono::Utc;
    use vigil_db::EventStore;
    use vigil_models::{BoundingBox, Embedding, FaceObservation, Frame, Outcome};

    struct Faces(Vec<FaceObservation>);

    impl FaceAnalyzer for Faces {
        fn faces(&self, _frame: &Frame) -> PerceptionResult<Vec<FaceObservation>> {
            Ok(self.0.clone())
        }
    }

    fn face(x: i32, v: &[f32]) -> FaceObservation {
        FaceObservation::new(BoundingBox::new(x, 0, 10, 10), Embedding::new(v.to_vec()))
    }

    fn live_frames() -> Arc<FrameStore> {
        let frames = Arc::new(FrameStore::new());
        let f = Frame::solid(8, 8, [50, 50, 50]);
        frames.publish(f.clone(), f, Vec::new(), Utc::now());
        frames
    }

    fn perception(
        faces: Vec<FaceObservation>,
        frames: Arc<FrameStore>,
    ) -> (FacePerception, Arc<EventStore>) {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        store.register("Alice", &Embedding::new(vec![1.0, 0.0, 0.0])).unwrap();
        store.register("Bob", &Embedding::new(vec![0.0, 1.0, 0.0])).unwrap();
        let resolver = IdentityResolver::new(Arc::clone(&store), 0.45, 0.5);
        let perception = FacePerception::new(
            Arc::new(Faces(faces)),
            resolver,
            frames,
            Duration::from_secs(1),
        );
        (perception, store)
    }

    fn published(perception: &mut FacePerception) -> Outcome<FaceTick> {
        match perception.tick(&StopSignal::new()) {
            TickOutcome::Publish(result) => result.outcome,
            other => panic!("expected a published result, got {other:?}"),
        }
    }

    #[test]
    fn test_best_is_highest_known_across_faces() {
        let (mut perception, store) = perception(
            vec![
                face(0, &[0.9, 0.3, 0.0]),
                face(20, &[0.0, 0.0, 1.0]),
                face(40, &[0.05, 1.0, 0.0]),
            ],
            live_frames(),
        );

        let outcome = published(&mut perception);
        let tick = outcome.result().unwrap();
        assert_eq!(tick.faces.len(), 3);
        assert_eq!(tick.best.as_ref().unwrap().name, "Bob");
        assert_eq!(tick.faces[0].resolution.name(), "Alice");
        assert!(matches!(
            tick.faces[1].resolution,
            Resolution::Unknown { created: true, .. }
        ));
        assert_eq!(tick.faces[1].bbox, BoundingBox::new(20, 0, 10, 10));

        // One event per face, one cluster for the stranger
        assert_eq!(store.recent_events(10).unwrap().len(), 3);
        assert_eq!(store.unknown_clusters().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_only_tick_has_no_best() {
        let (mut perception, store) = perception(vec![face(0, &[0.0, 0.0, 1.0])], live_frames());

        let first = published(&mut perception);
        let tick = first.result().unwrap();
        assert!(tick.best.is_none());
        let Resolution::Unknown { cluster_id, .. } = tick.faces[0].resolution else {
            panic!("expected an unknown face");
        };

        // The same stranger next tick joins the same cluster
        let second = published(&mut perception);
        match &second.result().unwrap().faces[0].resolution {
            Resolution::Unknown {
                cluster_id: again,
                sightings,
                ..
            } => {
                assert_eq!(*again, cluster_id);
                assert_eq!(*sightings, 2);
            }
            other => panic!("expected an unknown face, got {other:?}"),
        }
        assert_eq!(store.unknown_clusters().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_frame_publishes_no_face() {
        let (mut perception, store) = perception(Vec::new(), live_frames());
        assert_eq!(published(&mut perception).failure_code(), Some(FailureCode::NoFace));
        assert!(store.recent_events(10).unwrap().is_empty());
    }

    #[test]
    fn test_missing_frame_publishes_no_frame() {
        let (mut perception, _) =
            perception(vec![face(0, &[1.0, 0.0, 0.0])], Arc::new(FrameStore::new()));
        assert!(!perception.gate());
        assert_eq!(published(&mut perception).failure_code(), Some(FailureCode::NoFrame));
    }
}

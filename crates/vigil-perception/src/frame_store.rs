//! Latest-frame hand-off between the ingestion loop and its readers.
//!
//! The store holds one immutable [`FrameSnapshot`] behind an `Arc`.
//! Publishing swaps the whole `Arc` under a write lock, so a reader holds
//! either the old snapshot or the new one and never a mix of the two.
//! Frame buffers are reference-counted `Bytes`, which makes handing out a
//! snapshot as cheap as cloning a pointer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use vigil_models::{Detection, Frame, FrameVariant};

/// Everything one ingestion cycle produced.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub raw: Frame,
    pub annotated: Frame,
    pub detections: Vec<Detection>,
    pub captured_at: DateTime<Utc>,
    /// Publish counter, starting at 1
    pub sequence: u64,
}

impl FrameSnapshot {
    pub fn frame(&self, variant: FrameVariant) -> &Frame {
        match variant {
            FrameVariant::Raw => &self.raw,
            FrameVariant::Annotated => &self.annotated,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.detections.iter().any(|d| d.label == label)
    }
}

#[derive(Debug, Default)]
struct Slot {
    latest: Option<Arc<FrameSnapshot>>,
    published: u64,
}

/// Single-writer, many-reader holder of the latest snapshot.
#[derive(Debug, Default)]
pub struct FrameStore {
    slot: RwLock<Slot>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot. Returns the new sequence number.
    pub fn publish(
        &self,
        raw: Frame,
        annotated: Frame,
        detections: Vec<Detection>,
        captured_at: DateTime<Utc>,
    ) -> u64 {
        let mut slot = self.slot.write();
        slot.published += 1;
        let sequence = slot.published;
        slot.latest = Some(Arc::new(FrameSnapshot {
            raw,
            annotated,
            detections,
            captured_at,
            sequence,
        }));
        sequence
    }

    /// The whole latest snapshot, if anything was ever published.
    pub fn latest(&self) -> Option<Arc<FrameSnapshot>> {
        self.slot.read().latest.clone()
    }

    /// One variant of the latest frame.
    pub fn frame(&self, variant: FrameVariant) -> Option<Frame> {
        self.latest().map(|s| s.frame(variant).clone())
    }

    /// Whether the latest detection list contains `label`.
    pub fn has_label(&self, label: &str) -> bool {
        self.slot
            .read()
            .latest
            .as_ref()
            .map(|s| s.has_label(label))
            .unwrap_or(false)
    }

    /// Latest detections with their capture time.
    pub fn detections(&self) -> Option<(Vec<Detection>, DateTime<Utc>)> {
        self.latest().map(|s| (s.detections.clone(), s.captured_at))
    }

    /// True once at least one snapshot has been published.
    pub fn is_ready(&self) -> bool {
        self.slot.read().latest.is_some()
    }

    pub fn published(&self) -> u64 {
        self.slot.read().published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use vigil_models::BoundingBox;

    fn detection(label: &str) -> Detection {
        Detection::new(label, 0.9, BoundingBox::new(0, 0, 1, 1))
    }

    #[test]
    fn test_empty_store_is_not_ready() {
        let store = FrameStore::new();
        assert!(!store.is_ready());
        assert!(store.latest().is_none());
        assert!(store.frame(FrameVariant::Raw).is_none());
        assert!(!store.has_label("person"));
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let store = FrameStore::new();
        let raw = Frame::solid(2, 2, [1, 1, 1]);
        let annotated = Frame::solid(2, 2, [2, 2, 2]);
        assert_eq!(
            store.publish(raw.clone(), annotated.clone(), vec![detection("person")], Utc::now()),
            1
        );
        assert!(store.is_ready());
        assert!(store.has_label("person"));
        assert_eq!(store.frame(FrameVariant::Raw), Some(raw));
        assert_eq!(store.frame(FrameVariant::Annotated), Some(annotated));

        store.publish(
            Frame::solid(2, 2, [3, 3, 3]),
            Frame::solid(2, 2, [4, 4, 4]),
            vec![detection("cat")],
            Utc::now(),
        );
        assert!(!store.has_label("person"));
        assert!(store.has_label("cat"));
        assert_eq!(store.latest().unwrap().sequence, 2);
    }

    #[test]
    fn test_readers_never_see_mixed_publishes() {
        let store = Arc::new(FrameStore::new());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..500u32 {
                    let shade = (i % 251) as u8;
                    let label = format!("obj-{}", i);
                    store.publish(
                        Frame::solid(4, 4, [shade, 0, 0]),
                        Frame::solid(4, 4, [shade, 1, 1]),
                        vec![detection(&label)],
                        Utc::now(),
                    );
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        if let Some(snap) = store.latest() {
                            let i = snap.sequence - 1;
                            let shade = (i % 251) as u8;
                            assert_eq!(snap.raw.data[0], shade);
                            assert_eq!(snap.annotated.data[0], shade);
                            assert_eq!(snap.detections[0].label, format!("obj-{}", i));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(store.published(), 500);
    }
}

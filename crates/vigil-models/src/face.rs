//! Face observations, registered identities and unknown clusters.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{BoundingBox, Embedding};

/// A face seen in one frame by the face analyzer. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FaceObservation {
    /// Face box in source-frame pixels
    pub bbox: BoundingBox,
    /// Identity embedding
    pub embedding: Embedding,
}

impl FaceObservation {
    pub fn new(bbox: BoundingBox, embedding: Embedding) -> Self {
        Self { bbox, embedding }
    }

    /// Dimension of the embedding produced by the source model.
    pub fn dim(&self) -> usize {
        self.embedding.dim()
    }
}

/// One stored embedding belonging to a registered identity.
///
/// `canonical` is the embedding given at registration; auxiliary samples
/// added later carry `canonical = false`. Matching treats both alike.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSample {
    pub identity_id: i64,
    pub name: String,
    pub embedding: Embedding,
    pub canonical: bool,
}

/// Registered identity as listed to API consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IdentitySummary {
    pub id: i64,
    pub name: String,
    /// Canonical embedding plus auxiliary samples
    pub samples: u32,
    pub created_at: DateTime<Utc>,
}

/// A known identity scoring at or above the match threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IdentityMatch {
    pub id: i64,
    pub name: String,
    pub score: f32,
}

/// Provisional record for a recurring face nobody has named yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UnknownCluster {
    pub id: i64,
    /// Most recent embedding assigned to the cluster (not an average)
    pub embedding: Embedding,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sightings: u32,
}

impl UnknownCluster {
    /// Display name used in events and API responses.
    pub fn display_name(id: i64) -> String {
        format!("Unknown #{}", id)
    }
}

//! Face embeddings and the similarity measure used to compare them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Added to the norm product so zero vectors never divide by zero.
const NORM_EPSILON: f64 = 1e-10;

/// A fixed-length feature vector describing one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Number of components.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean norm, accumulated in `f64`.
    pub fn norm(&self) -> f64 {
        self.0
            .iter()
            .map(|&x| f64::from(x) * f64::from(x))
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine similarity `dot(a, b) / (|a| * |b| + eps)`.
    ///
    /// Returns `None` when either vector is empty or the lengths differ;
    /// such pairs are never comparable. Accumulation is done in `f64`; a
    /// non-finite result (infinite or NaN components) scores 0. The result
    /// is always within [-1, 1].
    pub fn cosine_similarity(&self, other: &Embedding) -> Option<f32> {
        if self.is_empty() || self.dim() != other.dim() {
            return None;
        }
        let dot: f64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(&a, &b)| f64::from(a) * f64::from(b))
            .sum();
        let score = dot / (self.norm() * other.norm() + NORM_EPSILON);
        if !score.is_finite() {
            return Some(0.0);
        }
        Some(score.clamp(-1.0, 1.0) as f32)
    }

    /// Little-endian `f32` encoding used for storage.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for v in &self.0 {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Decode a stored blob, checking it against the recorded dimension.
    ///
    /// Returns `None` when the blob length disagrees with `dim` or `dim` is
    /// zero; callers treat that row as corrupt and skip it.
    pub fn from_le_bytes(bytes: &[u8], dim: usize) -> Option<Self> {
        if dim == 0 || bytes.len() % 4 != 0 || bytes.len() / 4 != dim {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(Self(values))
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

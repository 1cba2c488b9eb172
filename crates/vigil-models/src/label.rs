use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A classifier output entry, as returned by every label/score collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Highest-scoring `k` entries, best first. NaN scores sort last.
pub fn top_k(mut items: Vec<LabelScore>, k: usize) -> Vec<LabelScore> {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or_else(|| a.score.is_nan().cmp(&b.score.is_nan()))
    });
    items.truncate(k);
    items
}

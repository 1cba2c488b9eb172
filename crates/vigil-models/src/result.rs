//! Last-result slot payloads published by perception workers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a worker tick produced no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// The frame store had nothing to read.
    NoFrame,
    /// The frame contained no face.
    NoFace,
    /// A classifier returned nothing usable.
    NoResults,
    /// An external inference call failed.
    InferenceFailed,
    /// An external service answered with something unparseable.
    InvalidResponse,
    /// A frame could not be encoded.
    EncodeFailed,
    /// The event/identity store rejected the operation.
    StoreFailed,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::NoFrame => "no_frame",
            FailureCode::NoFace => "no_face",
            FailureCode::NoResults => "no_results",
            FailureCode::InferenceFailed => "inference_failed",
            FailureCode::InvalidResponse => "invalid_response",
            FailureCode::EncodeFailed => "encode_failed",
            FailureCode::StoreFailed => "store_failed",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Success-with-payload or a typed failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Ok { result: T },
    Failed { code: FailureCode, message: String },
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok { .. })
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            Outcome::Ok { result } => Some(result),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn failure_code(&self) -> Option<FailureCode> {
        match self {
            Outcome::Ok { .. } => None,
            Outcome::Failed { code, .. } => Some(*code),
        }
    }
}

/// One published tick: what happened and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TickResult<T> {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: Outcome<T>,
}

impl<T> TickResult<T> {
    pub fn ok(result: T) -> Self {
        Self {
            at: Utc::now(),
            outcome: Outcome::Ok { result },
        }
    }

    pub fn failed(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            outcome: Outcome::Failed {
                code,
                message: message.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

//! Timeline and attendance.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use vigil_models::{AttendanceEntry, Event};

use super::blocking;
use crate::error::ApiResult;
use crate::state::AppState;

const DEFAULT_EVENTS_LIMIT: usize = 100;
const DEFAULT_ATTENDANCE_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
}

#[derive(Serialize)]
pub struct AttendanceResponse {
    pub attendance: Vec<AttendanceEntry>,
}

/// Newest events first.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<EventsResponse>> {
    let limit = query.resolve(DEFAULT_EVENTS_LIMIT);
    let store = state.store.clone();
    let events = blocking(move || Ok(store.recent_events(limit)?)).await?;
    Ok(Json(EventsResponse { events }))
}

pub async fn attendance(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<AttendanceResponse>> {
    let limit = query.resolve(DEFAULT_ATTENDANCE_LIMIT);
    let store = state.store.clone();
    let attendance = blocking(move || Ok(store.attendance(limit)?)).await?;
    Ok(Json(AttendanceResponse { attendance }))
}

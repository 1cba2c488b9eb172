//! Face registration and recognition.

use axum::extract::{Path, Query, State};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vigil_models::{IdentitySummary, TickResult};
use vigil_perception::{FaceMeta, FaceTick, Resolution};

use super::{blocking, load_image, ImageSource};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct FacesResponse {
    pub faces: Vec<IdentitySummary>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterQuery {
    pub name: String,
    #[serde(default)]
    pub source: ImageSource,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub name: String,
    /// False when the image was added as another sample of an existing name
    pub created: bool,
    pub meta: FaceMeta,
}

#[derive(Serialize)]
pub struct SampleResponse {
    pub identity_id: i64,
    pub sample_id: i64,
    pub meta: FaceMeta,
}

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    #[serde(default)]
    pub source: ImageSource,
}

/// Known best plus matches, or the unknown cluster the face was assigned to.
#[derive(Serialize)]
pub struct RecognizeResponse {
    pub threshold: f32,
    #[serde(flatten)]
    pub resolution: Resolution,
    pub meta: FaceMeta,
}

/// Last published result of a worker.
#[derive(Serialize)]
pub struct LastResponse<T> {
    pub result: Option<TickResult<T>>,
}

pub async fn list_faces(State(state): State<AppState>) -> ApiResult<Json<FacesResponse>> {
    let store = state.store.clone();
    let faces = blocking(move || Ok(store.list_identities()?)).await?;
    Ok(Json(FacesResponse { faces }))
}

/// Register the largest face in the image under `name`.
pub async fn register_face(
    State(state): State<AppState>,
    Query(query): Query<RegisterQuery>,
    body: Bytes,
) -> ApiResult<Json<RegisterResponse>> {
    if query.name.trim().is_empty() {
        return Err(ApiError::bad_request("name_required"));
    }
    let frame = load_image(&state, query.source, &body)?;

    let analyzer = state.faces.clone();
    let store = state.store.clone();
    let name = query.name;
    let response = blocking(move || {
        let (face, meta) = analyzer.largest_face(&frame)?;
        let face = face.ok_or(ApiError::NoFace)?;
        let registration = store.register(&name, &face.embedding)?;
        Ok(RegisterResponse {
            id: registration.identity_id,
            name: registration.name,
            created: registration.created,
            meta,
        })
    })
    .await?;

    info!(identity_id = response.id, name = %response.name, created = response.created, "Face registered");
    Ok(Json(response))
}

/// Attach the largest face in the image to an existing identity.
pub async fn add_face_sample(
    State(state): State<AppState>,
    Path(identity_id): Path<i64>,
    Query(query): Query<SourceQuery>,
    body: Bytes,
) -> ApiResult<Json<SampleResponse>> {
    let frame = load_image(&state, query.source, &body)?;

    let analyzer = state.faces.clone();
    let store = state.store.clone();
    let response = blocking(move || {
        let (face, meta) = analyzer.largest_face(&frame)?;
        let face = face.ok_or(ApiError::NoFace)?;
        let sample_id = store.add_sample(identity_id, &face.embedding)?;
        Ok(SampleResponse {
            identity_id,
            sample_id,
            meta,
        })
    })
    .await?;

    info!(identity_id, sample_id = response.sample_id, "Face sample added");
    Ok(Json(response))
}

/// Resolve the largest face in the image.
///
/// A face below the known threshold joins or seeds an unknown cluster, the
/// same as a face worker sighting. No timeline event is written.
pub async fn recognize_face(
    State(state): State<AppState>,
    Query(query): Query<SourceQuery>,
    body: Bytes,
) -> ApiResult<Json<RecognizeResponse>> {
    let frame = load_image(&state, query.source, &body)?;

    let analyzer = state.faces.clone();
    let resolver = state.resolver.clone();
    blocking(move || {
        let (face, meta) = analyzer.largest_face(&frame)?;
        let face = face.ok_or(ApiError::NoFace)?;
        let resolution = resolver.resolve(&face.embedding)?;
        debug!(name = resolution.name(), "Face recognized");
        Ok(Json(RecognizeResponse {
            threshold: resolver.known_threshold(),
            resolution,
            meta,
        }))
    })
    .await
}

pub async fn face_last(State(state): State<AppState>) -> Json<LastResponse<FaceTick>> {
    Json(LastResponse {
        result: state.workers.face.last(),
    })
}

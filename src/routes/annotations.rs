//! Annotation endpoints.
//!
//! POST   /api/v1/annotations/render      render (or debounce) a document
//! POST   /api/v1/annotations/open        document opened; honors auto-trigger
//! GET    /api/v1/annotations?path=       latest decorations and phase
//! DELETE /api/v1/annotations?path=       clear decorations
//! POST   /api/v1/annotations/invalidate  drop cached state for a document
//! POST   /api/v1/annotations/toggle      enable/disable a document
//! PUT    /api/v1/annotations/theme       switch light/dark colors
//! GET|PUT /api/v1/annotations/config     read or replace the configuration
//! GET    /api/v1/annotations/notices     drain pending notices
//! GET    /api/v1/annotations/stats       cache and in-flight counters
//!
//! Rendering pushes into the shared `DecorationStore`; handlers read back
//! from it, so a response always reflects the latest applied pass.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::annotate::{Annotator, AnnotatorStats, ThemeKind};
use crate::config::AnnotationConfig;
use crate::error::{AppError, Result};
use crate::models::{DecorationSet, Notice, RenderPhase};
use crate::routes::store::DecorationStore;

#[derive(Clone)]
pub struct AnnotationState {
    pub annotator: Arc<Annotator>,
    pub store: Arc<DecorationStore>,
}

pub fn routes(state: AnnotationState) -> Router {
    Router::new()
        .route(
            "/api/v1/annotations",
            get(get_annotations).delete(clear_annotations),
        )
        .route("/api/v1/annotations/render", post(render))
        .route("/api/v1/annotations/open", post(open))
        .route("/api/v1/annotations/invalidate", post(invalidate))
        .route("/api/v1/annotations/toggle", post(toggle))
        .route("/api/v1/annotations/theme", put(set_theme))
        .route("/api/v1/annotations/config", get(get_config).put(put_config))
        .route("/api/v1/annotations/notices", get(get_notices))
        .route("/api/v1/annotations/stats", get(get_stats))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: String,
}

#[derive(Debug, Deserialize)]
struct RenderRequest {
    path: String,
    lines: Vec<String>,
    cursor_line: Option<usize>,
    /// Coalesce with other requests for the same document instead of
    /// rendering now
    #[serde(default)]
    debounce: bool,
}

#[derive(Debug, Deserialize)]
struct OpenRequest {
    path: String,
    lines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ToggleRequest {
    path: String,
    /// Flip the current state when absent
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ThemeRequest {
    theme: ThemeKind,
}

#[derive(Debug, Serialize)]
struct AnnotationResponse {
    path: String,
    phase: RenderPhase,
    enabled: bool,
    decorations: Option<DecorationSet>,
}

#[derive(Debug, Serialize)]
struct ToggleResponse {
    path: String,
    enabled: bool,
}

fn validate_path(path: &str) -> Result<()> {
    if path.trim().is_empty() || path.contains('\0') {
        return Err(AppError::InvalidPath(path.to_string()));
    }
    Ok(())
}

fn snapshot(state: &AnnotationState, path: &str) -> AnnotationResponse {
    AnnotationResponse {
        path: path.to_string(),
        phase: state.annotator.phase(path),
        enabled: !state.annotator.is_disabled(path),
        decorations: state.store.get(path),
    }
}

async fn render(
    State(state): State<AnnotationState>,
    Json(request): Json<RenderRequest>,
) -> Result<(StatusCode, Json<AnnotationResponse>)> {
    validate_path(&request.path)?;

    if request.debounce {
        state
            .annotator
            .schedule_render(&request.path, request.lines, request.cursor_line);
        return Ok((StatusCode::ACCEPTED, Json(snapshot(&state, &request.path))));
    }

    state
        .annotator
        .render_request(&request.path, &request.lines, request.cursor_line)
        .await;
    Ok((StatusCode::OK, Json(snapshot(&state, &request.path))))
}

async fn open(
    State(state): State<AnnotationState>,
    Json(request): Json<OpenRequest>,
) -> Result<Json<AnnotationResponse>> {
    validate_path(&request.path)?;
    state.annotator.open_document(&request.path, &request.lines).await;
    Ok(Json(snapshot(&state, &request.path)))
}

async fn get_annotations(
    State(state): State<AnnotationState>,
    Query(query): Query<PathQuery>,
) -> Result<Json<AnnotationResponse>> {
    validate_path(&query.path)?;
    let response = snapshot(&state, &query.path);
    if response.decorations.is_none() && response.phase == RenderPhase::Idle {
        return Err(AppError::DocumentNotFound(query.path));
    }
    Ok(Json(response))
}

async fn clear_annotations(
    State(state): State<AnnotationState>,
    Query(query): Query<PathQuery>,
) -> Result<StatusCode> {
    validate_path(&query.path)?;
    state.annotator.clear(&query.path);
    Ok(StatusCode::NO_CONTENT)
}

async fn invalidate(
    State(state): State<AnnotationState>,
    Json(request): Json<PathQuery>,
) -> Result<StatusCode> {
    validate_path(&request.path)?;
    state.annotator.invalidate(&request.path);
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle(
    State(state): State<AnnotationState>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<ToggleResponse>> {
    validate_path(&request.path)?;
    let enabled = match request.enabled {
        Some(enabled) => {
            state.annotator.set_enabled(&request.path, enabled);
            enabled
        }
        None => state.annotator.toggle(&request.path),
    };
    Ok(Json(ToggleResponse {
        path: request.path,
        enabled,
    }))
}

async fn set_theme(
    State(state): State<AnnotationState>,
    Json(request): Json<ThemeRequest>,
) -> StatusCode {
    state.annotator.set_theme(request.theme);
    StatusCode::NO_CONTENT
}

async fn get_config(State(state): State<AnnotationState>) -> Json<AnnotationConfig> {
    Json(state.annotator.config().as_ref().clone())
}

async fn put_config(
    State(state): State<AnnotationState>,
    Json(config): Json<AnnotationConfig>,
) -> Result<Json<AnnotationConfig>> {
    state.annotator.update_config(config)?;
    Ok(Json(state.annotator.config().as_ref().clone()))
}

async fn get_notices(State(state): State<AnnotationState>) -> Json<Vec<Notice>> {
    Json(state.store.drain_notices())
}

async fn get_stats(State(state): State<AnnotationState>) -> Json<AnnotatorStats> {
    Json(state.annotator.stats())
}

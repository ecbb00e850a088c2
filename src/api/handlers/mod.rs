use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::judging::{self, EngineError};
use crate::models::*;
use crate::ranking::{self, RankMethod, RankedProject};

// ============================================================
// Error Handling
// ============================================================

/// Map an engine failure onto an HTTP response.
///
/// Validation failures carry their message to the client; storage failures
/// are logged server-side and sanitized to avoid leaking internals.
fn engine_error(e: EngineError) -> (StatusCode, String) {
    match e {
        EngineError::Validation(msg) => {
            tracing::warn!("Validation error: {}", msg);
            (StatusCode::BAD_REQUEST, msg)
        }
        EngineError::Conflict(attempts) => {
            tracing::warn!("Pick conflict after {} attempts", attempts);
            (
                StatusCode::CONFLICT,
                "Could not assign a project, please try again".to_string(),
            )
        }
        EngineError::Store(err) => {
            tracing::error!("Storage error: {:#}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

/// Log an internal error and return a sanitized response to the client.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Judge identity comes from the external login layer as an `X-Judge-Id`
/// header on judge-flow routes.
fn judge_id(headers: &HeaderMap) -> Result<Uuid, (StatusCode, String)> {
    headers
        .get("X-Judge-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or((
            StatusCode::BAD_REQUEST,
            "missing or invalid X-Judge-Id header".to_string(),
        ))
}

fn load_judge(state: &AppState, headers: &HeaderMap) -> Result<Judge, (StatusCode, String)> {
    let id = judge_id(headers)?;
    state
        .db
        .get_judge(id)
        .map_err(internal_error)?
        .ok_or((StatusCode::BAD_REQUEST, "unknown judge".to_string()))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Judge flow
// ============================================================

/// `{"project_id": ...}` on success, `{}` when no project is available.
pub async fn next_project(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = judge_id(&headers)?;
    let picked = judging::pick_next_project(&state.db, &state.comps, id).map_err(engine_error)?;
    match picked {
        Some(project) => Ok(Json(serde_json::json!({ "project_id": project.id }))),
        None => Ok(Json(serde_json::json!({}))),
    }
}

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    pub reason: String,
}

pub async fn skip_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SkipRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = judge_id(&headers)?;
    judging::skip_current_project(&state.db, id, &req.reason).map_err(engine_error)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn take_break(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = judge_id(&headers)?;
    judging::skip_current_project(&state.db, id, "break").map_err(engine_error)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub categories: BTreeMap<String, i64>,
    #[serde(default)]
    pub notes: String,
}

pub async fn score_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ScoreRequest>,
) -> Result<(StatusCode, Json<JudgedProject>), (StatusCode, String)> {
    let id = judge_id(&headers)?;
    judging::score_current_project(&state.db, &state.comps, id, req.categories, req.notes)
        .map(|judged| (StatusCode::CREATED, Json(judged)))
        .map_err(engine_error)
}

#[derive(Debug, Deserialize)]
pub struct UpdateScoreRequest {
    pub project: Uuid,
    pub categories: BTreeMap<String, i64>,
}

pub async fn update_score(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateScoreRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = judge_id(&headers)?;
    judging::update_score(&state.db, id, req.project, req.categories).map_err(engine_error)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotesRequest {
    pub project: Uuid,
    pub notes: String,
}

pub async fn update_notes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateNotesRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = judge_id(&headers)?;
    judging::update_notes(&state.db, id, req.project, req.notes).map_err(engine_error)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct RankRequest {
    pub ranking: Vec<Uuid>,
}

pub async fn update_rankings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RankRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = judge_id(&headers)?;
    let updated = state
        .db
        .set_current_rankings(id, &req.ranking)
        .map_err(internal_error)?;
    if !updated {
        return Err((StatusCode::BAD_REQUEST, "unknown judge".to_string()));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct BatchRankingRequest {
    pub batch_ranking: Vec<Uuid>,
}

pub async fn submit_batch_ranking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BatchRankingRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = judge_id(&headers)?;
    judging::submit_batch_ranking(&state.db, id, &req.batch_ranking).map_err(engine_error)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn judge_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<JudgedProject>>, (StatusCode, String)> {
    let judge = load_judge(&state, &headers)?;
    Ok(Json(judge.seen_projects))
}

/// A judgement enriched with the project's current URL for display.
#[derive(Debug, Serialize)]
pub struct JudgedProjectWithUrl {
    #[serde(flatten)]
    pub judged: JudgedProject,
    pub url: Option<String>,
}

pub async fn judged_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
) -> Result<Json<JudgedProjectWithUrl>, (StatusCode, String)> {
    let judge = load_judge(&state, &headers)?;
    let judged = judging::find_judged_project(&judge, project_id)
        .cloned()
        .ok_or((StatusCode::BAD_REQUEST, "invalid project ID".to_string()))?;

    let url = state
        .db
        .get_project(project_id)
        .map_err(internal_error)?
        .and_then(|p| p.url);

    Ok(Json(JudgedProjectWithUrl { judged, url }))
}

pub async fn check_read_welcome(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let judge = load_judge(&state, &headers)?;
    Ok(Json(serde_json::json!({ "read_welcome": judge.read_welcome })))
}

pub async fn set_read_welcome(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = judge_id(&headers)?;
    let updated = state.db.set_judge_read_welcome(id).map_err(internal_error)?;
    if !updated {
        return Err((StatusCode::BAD_REQUEST, "unknown judge".to_string()));
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    let options = state.db.get_options().map_err(internal_error)?;
    Ok(Json(options.categories))
}

pub async fn batch_ranking_size(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let options = state.db.get_options().map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "brs": options.batch_ranking_size })))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<Project>>, (StatusCode, String)> {
    state.db.get_all_projects().map(Json).map_err(internal_error)
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectInput>,
) -> Result<(StatusCode, Json<Project>), (StatusCode, String)> {
    state
        .db
        .create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(internal_error)
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, (StatusCode, String)> {
    state
        .db
        .get_project(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))
}

async fn set_prioritized(
    state: AppState,
    id: Uuid,
    prioritized: bool,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if state
        .db
        .set_project_prioritized(id, prioritized)
        .map_err(internal_error)?
    {
        Ok(Json(serde_json::json!({ "ok": true })))
    } else {
        Err((StatusCode::NOT_FOUND, "Project not found".to_string()))
    }
}

pub async fn prioritize_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    set_prioritized(state, id, true).await
}

pub async fn unprioritize_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    set_prioritized(state, id, false).await
}

async fn set_hidden(
    state: AppState,
    id: Uuid,
    hidden: bool,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if state
        .db
        .set_project_active(id, !hidden)
        .map_err(internal_error)?
    {
        Ok(Json(serde_json::json!({ "ok": true })))
    } else {
        Err((StatusCode::NOT_FOUND, "Project not found".to_string()))
    }
}

pub async fn hide_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    set_hidden(state, id, true).await
}

pub async fn unhide_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    set_hidden(state, id, false).await
}

// ============================================================
// Judges
// ============================================================

pub async fn list_judges(
    State(state): State<AppState>,
) -> Result<Json<Vec<Judge>>, (StatusCode, String)> {
    state.db.get_all_judges().map(Json).map_err(internal_error)
}

pub async fn create_judge(
    State(state): State<AppState>,
    Json(input): Json<CreateJudgeInput>,
) -> Result<(StatusCode, Json<Judge>), (StatusCode, String)> {
    state
        .db
        .create_judge(input)
        .map(|j| (StatusCode::CREATED, Json(j)))
        .map_err(internal_error)
}

async fn set_judge_hidden(
    state: AppState,
    id: Uuid,
    hidden: bool,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if state
        .db
        .set_judge_active(id, !hidden)
        .map_err(internal_error)?
    {
        Ok(Json(serde_json::json!({ "ok": true })))
    } else {
        Err((StatusCode::NOT_FOUND, "Judge not found".to_string()))
    }
}

pub async fn hide_judge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    set_judge_hidden(state, id, true).await
}

pub async fn unhide_judge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    set_judge_hidden(state, id, false).await
}

#[derive(Debug, Deserialize)]
pub struct JudgeNotesRequest {
    pub notes: String,
}

pub async fn set_judge_notes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<JudgeNotesRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if state
        .db
        .update_judge_notes(id, &req.notes)
        .map_err(internal_error)?
    {
        Ok(Json(serde_json::json!({ "ok": true })))
    } else {
        Err((StatusCode::NOT_FOUND, "Judge not found".to_string()))
    }
}

// ============================================================
// Admin
// ============================================================

pub async fn list_flags(
    State(state): State<AppState>,
) -> Result<Json<Vec<Flag>>, (StatusCode, String)> {
    state.db.get_all_flags().map(Json).map_err(internal_error)
}

pub async fn stats(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let projects = state.db.project_stats().map_err(internal_error)?;
    let judges = state.db.judge_stats().map_err(internal_error)?;
    Ok(Json(serde_json::json!({
        "projects": projects,
        "judges": judges,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MinViewsRequest {
    pub min_views: i64,
}

pub async fn set_min_views(
    State(state): State<AppState>,
    Json(req): Json<MinViewsRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if req.min_views < 0 {
        return Err((StatusCode::BAD_REQUEST, "min_views must be non-negative".to_string()));
    }
    state
        .db
        .update_min_views(req.min_views)
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct RankingBatchSizeRequest {
    pub ranking_batch_size: i64,
}

pub async fn set_ranking_batch_size(
    State(state): State<AppState>,
    Json(req): Json<RankingBatchSizeRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if req.ranking_batch_size < 1 {
        return Err((
            StatusCode::BAD_REQUEST,
            "ranking_batch_size must be at least 1".to_string(),
        ));
    }
    state
        .db
        .update_batch_ranking_size(req.ranking_batch_size)
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn judging_ended(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let options = state.db.get_options().map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "judging_ended": options.judging_ended })))
}

#[derive(Debug, Deserialize)]
pub struct EndJudgingRequest {
    pub judging_ended: bool,
}

pub async fn end_judging(
    State(state): State<AppState>,
    Json(req): Json<EndJudgingRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    state
        .db
        .set_judging_ended(req.judging_ended)
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn rankings(
    state: AppState,
    method: RankMethod,
) -> Result<Json<Vec<RankedProject>>, (StatusCode, String)> {
    ranking::scores_from_db(&state.db, method)
        .map(Json)
        .map_err(internal_error)
}

pub async fn borda_rankings(
    State(state): State<AppState>,
) -> Result<Json<Vec<RankedProject>>, (StatusCode, String)> {
    rankings(state, RankMethod::Borda).await
}

pub async fn copeland_rankings(
    State(state): State<AppState>,
) -> Result<Json<Vec<RankedProject>>, (StatusCode, String)> {
    rankings(state, RankMethod::Copeland).await
}

//! Playback progress tracking
//!
//! One row per (user, session); saving again moves the resume point.
//! Reads are forgiving: a user who never watched a session gets a zero
//! resume point, not an error.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use casehub_common::time::now_ms;

use crate::db::sessions::{self, SessionKind};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/save", post(save_progress))
        .route("/get/:user_id/:session_id", get(get_progress))
        .route("/getAll/:user_id", get(get_all_progress))
}

#[derive(Debug, Deserialize)]
struct SaveBody {
    user_id: String,
    session_id: String,
    /// "DicomCase", "RecordedLecture", or "LiveProgram"
    session_kind: String,
    current_time: f64,
}

async fn save_progress(
    State(state): State<AppState>,
    Json(body): Json<SaveBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let Some(kind) = SessionKind::from_progress_label(&body.session_kind) else {
        return Err(ApiError::invalid(
            "session_kind must be DicomCase, RecordedLecture, or LiveProgram",
        ));
    };
    if !body.current_time.is_finite() || body.current_time < 0.0 {
        return Err(ApiError::invalid("current_time must be non-negative"));
    }
    if sessions::fetch_by_id(&state.db, kind, &body.session_id)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found("Session not found"));
    }

    sqlx::query(
        "INSERT INTO playback_progress
             (guid, user_id, session_id, session_kind, current_time_secs, last_watched_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (user_id, session_id) DO UPDATE SET
             current_time_secs = excluded.current_time_secs,
             session_kind = excluded.session_kind,
             last_watched_at = excluded.last_watched_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&body.user_id)
    .bind(&body.session_id)
    .bind(&body.session_kind)
    .bind(body.current_time)
    .bind(now_ms())
    .execute(&state.db)
    .await?;

    Ok(Json(json!({ "message": "Progress saved" })))
}

async fn get_progress(
    State(state): State<AppState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let row = sqlx::query(
        "SELECT current_time_secs, last_watched_at
         FROM playback_progress WHERE user_id = ? AND session_id = ?",
    )
    .bind(&user_id)
    .bind(&session_id)
    .fetch_optional(&state.db)
    .await?;

    match row {
        Some(row) => Ok(Json(json!({
            "current_time": row.get::<f64, _>("current_time_secs"),
            "last_watched_at": row.get::<i64, _>("last_watched_at"),
        }))),
        // Never watched: a fresh start, not an error
        None => Ok(Json(json!({ "current_time": 0 }))),
    }
}

#[derive(Debug, Deserialize)]
struct AllParams {
    #[serde(default)]
    session_kind: Option<String>,
}

/// Continue-watching card
#[derive(Debug, Serialize)]
struct ProgressCard {
    session_id: String,
    title: String,
    /// "Case", "Lecture", or "Live"
    kind: &'static str,
    difficulty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_name: Option<String>,
    current_time: f64,
    last_watched_at: i64,
}

fn card_kind(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Dicom => "Case",
        SessionKind::Vimeo => "Lecture",
        SessionKind::Live => "Live",
    }
}

async fn get_all_progress(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<AllParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query(
        "SELECT session_id, session_kind, current_time_secs, last_watched_at
         FROM playback_progress
         WHERE user_id = ?
         ORDER BY last_watched_at DESC",
    )
    .bind(&user_id)
    .fetch_all(&state.db)
    .await?;

    let mut cards = Vec::new();
    for row in &rows {
        let kind_label: String = row.get("session_kind");
        if let Some(filter) = &params.session_kind {
            if *filter != kind_label {
                continue;
            }
        }
        let Some(kind) = SessionKind::from_progress_label(&kind_label) else {
            continue;
        };
        let session_id: String = row.get("session_id");
        let Some(session) = sessions::fetch_by_id(&state.db, kind, &session_id).await? else {
            continue;
        };
        cards.push(ProgressCard {
            session_id,
            title: session.title,
            kind: card_kind(kind),
            difficulty: session.difficulty,
            thumbnail: session.image_url_522x760.or(session.image_url_1920x1080),
            duration: session.session_duration,
            module_name: session.module_name,
            current_time: row.get("current_time_secs"),
            last_watched_at: row.get("last_watched_at"),
        });
    }
    Ok(Json(json!({ "data": cards })))
}

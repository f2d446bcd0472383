//! Observation checklists and scoring
//!
//! An observation set belongs to a session and holds the findings a
//! learner should call out. Submissions are graded against the stored
//! correct answers and accumulate into a per-(user, session) score row.

use axum::extract::{Extension, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use casehub_common::time::now_ms;

use crate::api::middleware::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::{protected, AppState};

pub fn routes(state: AppState) -> Router<AppState> {
    let open = Router::new()
        .route("/get", get(get_observations))
        .route("/create", post(create_observation))
        .route("/scores", get(session_scores));
    let authed = protected(
        Router::new()
            .route("/submit", post(submit_observation))
            .route("/scores/:user_id/:session_id", get(user_score)),
        &state,
    );
    open.merge(authed)
}

#[derive(Debug, Deserialize)]
struct ObservationItemBody {
    observation_text: String,
    #[serde(default)]
    faculty_observation: Option<String>,
    #[serde(default)]
    correct_answer: Option<String>,
    #[serde(default)]
    points: i64,
}

#[derive(Debug, Deserialize)]
struct CreateObservationBody {
    session_id: String,
    #[serde(default)]
    session_name: Option<String>,
    module_name: String,
    items: Vec<ObservationItemBody>,
}

async fn create_observation(
    State(state): State<AppState>,
    Json(body): Json<CreateObservationBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.session_id.trim().is_empty() {
        return Err(ApiError::invalid("session_id is required"));
    }
    if body.items.is_empty() {
        return Err(ApiError::invalid("At least one observation item is required"));
    }

    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO observations (guid, session_id, session_name, module_name, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&guid)
    .bind(&body.session_id)
    .bind(&body.session_name)
    .bind(&body.module_name)
    .bind(now_ms())
    .execute(&state.db)
    .await?;

    for item in &body.items {
        sqlx::query(
            "INSERT INTO observation_items
                 (guid, observation_id, observation_text, faculty_observation, correct_answer, points)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&guid)
        .bind(&item.observation_text)
        .bind(&item.faculty_observation)
        .bind(&item.correct_answer)
        .bind(item.points)
        .execute(&state.db)
        .await?;
    }

    Ok(Json(json!({
        "message": "Observation created successfully",
        "observation_id": guid,
    })))
}

#[derive(Debug, Deserialize)]
struct GetParams {
    video_id: String,
}

/// GET /get?video_id=: observation sets with their items
async fn get_observations(
    State(state): State<AppState>,
    Query(params): Query<GetParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let sets = sqlx::query(
        "SELECT guid, session_id, session_name, module_name FROM observations WHERE session_id = ?",
    )
    .bind(&params.video_id)
    .fetch_all(&state.db)
    .await?;

    let mut data = Vec::new();
    for set in &sets {
        let observation_id: String = set.get("guid");
        let items = sqlx::query(
            "SELECT guid, observation_text, faculty_observation, points
             FROM observation_items WHERE observation_id = ? ORDER BY rowid",
        )
        .bind(&observation_id)
        .fetch_all(&state.db)
        .await?;
        let items: Vec<serde_json::Value> = items
            .iter()
            .map(|i| {
                json!({
                    "guid": i.get::<String, _>("guid"),
                    "observation_text": i.get::<String, _>("observation_text"),
                    "faculty_observation": i.get::<Option<String>, _>("faculty_observation"),
                    "points": i.get::<i64, _>("points"),
                })
            })
            .collect();
        data.push(json!({
            "guid": observation_id,
            "session_id": set.get::<String, _>("session_id"),
            "session_name": set.get::<Option<String>, _>("session_name"),
            "module_name": set.get::<String, _>("module_name"),
            "items": items,
        }));
    }
    Ok(Json(json!({ "data": data })))
}

#[derive(Debug, Deserialize)]
struct SubmitAnswer {
    item_id: String,
    answer: String,
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    session_id: String,
    answers: Vec<SubmitAnswer>,
}

/// POST /submit: grade a batch of answers and accumulate the score
async fn submit_observation(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<SubmitBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.answers.is_empty() {
        return Err(ApiError::invalid("answers must not be empty"));
    }

    let mut total_correct: i64 = 0;
    let mut score: i64 = 0;
    for answer in &body.answers {
        let row = sqlx::query(
            "SELECT correct_answer, points FROM observation_items WHERE guid = ?",
        )
        .bind(&answer.item_id)
        .fetch_optional(&state.db)
        .await?;
        let Some(row) = row else {
            continue;
        };
        let correct: Option<String> = row.get("correct_answer");
        let points: i64 = row.get("points");
        if let Some(correct) = correct {
            if correct.trim().eq_ignore_ascii_case(answer.answer.trim()) {
                total_correct += 1;
                score += points;
            }
        }
    }

    let attempts = body.answers.len() as i64;
    sqlx::query(
        "INSERT INTO observation_scores
             (guid, user_id, session_id, total_correct, total_attempts, score, started_at, completed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (user_id, session_id) DO UPDATE SET
             total_correct = total_correct + excluded.total_correct,
             total_attempts = total_attempts + excluded.total_attempts,
             score = score + excluded.score,
             completed_at = excluded.completed_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user.user_id)
    .bind(&body.session_id)
    .bind(total_correct)
    .bind(attempts)
    .bind(score)
    .bind(now_ms())
    .bind(now_ms())
    .execute(&state.db)
    .await?;

    Ok(Json(json!({
        "total_correct": total_correct,
        "total_attempts": attempts,
        "score": score,
    })))
}

async fn user_score(
    State(state): State<AppState>,
    Path((user_id, session_id)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let row = sqlx::query(
        "SELECT total_correct, total_attempts, score
         FROM observation_scores WHERE user_id = ? AND session_id = ?",
    )
    .bind(&user_id)
    .bind(&session_id)
    .fetch_optional(&state.db)
    .await?;
    match row {
        Some(row) => Ok(Json(json!({
            "total_correct": row.get::<i64, _>("total_correct"),
            "total_attempts": row.get::<i64, _>("total_attempts"),
            "score": row.get::<i64, _>("score"),
        }))),
        None => Ok(Json(json!({ "total_correct": 0, "total_attempts": 0, "score": 0 }))),
    }
}

#[derive(Debug, Deserialize)]
struct ScoresParams {
    #[serde(default)]
    session_type: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
}

/// GET /scores: per-session score totals joined onto the catalog
async fn session_scores(
    State(state): State<AppState>,
    Query(params): Query<ScoresParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let include_lectures = params.session_type.as_deref() == Some("All");
    let difficulty = params.difficulty.as_deref();

    let mut data = score_join(&state, "dicom_cases", difficulty).await?;
    if include_lectures {
        data.extend(score_join(&state, "recorded_lectures", difficulty).await?);
    }
    Ok(Json(json!({ "data": data })))
}

async fn score_join(
    state: &AppState,
    table: &str,
    difficulty: Option<&str>,
) -> ApiResult<Vec<serde_json::Value>> {
    let base = format!(
        "SELECT s.guid, s.title, s.difficulty,
                COALESCE(SUM(o.score), 0) AS total_score,
                COALESCE(SUM(o.total_attempts), 0) AS total_attempts,
                COUNT(o.guid) AS participants
         FROM {} s
         LEFT JOIN observation_scores o ON o.session_id = s.guid
         {}
         GROUP BY s.guid
         ORDER BY total_score DESC",
        table,
        if difficulty.is_some() {
            "WHERE s.difficulty = ?"
        } else {
            ""
        }
    );
    let mut query = sqlx::query(&base);
    if let Some(difficulty) = difficulty {
        query = query.bind(difficulty);
    }
    let rows = query.fetch_all(&state.db).await?;
    Ok(rows
        .iter()
        .map(|r| {
            json!({
                "session_id": r.get::<String, _>("guid"),
                "title": r.get::<String, _>("title"),
                "difficulty": r.get::<String, _>("difficulty"),
                "total_score": r.get::<i64, _>("total_score"),
                "total_attempts": r.get::<i64, _>("total_attempts"),
                "participants": r.get::<i64, _>("participants"),
            })
        })
        .collect())
}

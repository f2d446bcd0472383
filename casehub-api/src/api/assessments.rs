//! Assessment questions, grading, and the points leaderboard

use axum::extract::{Extension, Path, Query, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use casehub_common::time::now_ms;

use crate::api::middleware::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::{protected, AppState};

/// Points awarded for one correct answer
const POINTS_PER_CORRECT: i64 = 5;
const LEADERBOARD_SIZE: i64 = 10;

pub fn routes(state: AppState) -> Router<AppState> {
    let open = Router::new()
        .route("/get", get(list_assessments))
        .route("/get/:id", get(get_assessment))
        .route("/getByModule", get(by_module))
        .route("/topUsers", get(top_users));
    let authed = protected(
        Router::new()
            .route("/create", post(create_assessment))
            .route("/update/:id", put(update_assessment))
            .route("/delete/:id", delete(delete_assessment))
            .route("/submit", post(submit_answer))
            .route("/getUserPoints", get(user_points)),
        &state,
    );
    open.merge(authed)
}

const ANSWERS: [&str; 4] = ["a", "b", "c", "d"];

#[derive(Debug, Deserialize)]
struct AssessmentBody {
    module_id: String,
    #[serde(default)]
    difficulty: Option<String>,
    question: String,
    #[serde(default)]
    description: Option<String>,
    option_a: String,
    option_b: String,
    option_c: String,
    option_d: String,
    correct_answer: String,
    #[serde(default)]
    image: Option<String>,
}

impl AssessmentBody {
    fn validate(&self) -> ApiResult<()> {
        if self.question.trim().is_empty() {
            return Err(ApiError::invalid("question is required"));
        }
        if self.module_id.trim().is_empty() {
            return Err(ApiError::invalid("module_id is required"));
        }
        if !ANSWERS.contains(&self.correct_answer.as_str()) {
            return Err(ApiError::invalid("correct_answer must be a, b, c, or d"));
        }
        Ok(())
    }
}

fn assessment_json(row: &SqliteRow) -> serde_json::Value {
    json!({
        "guid": row.get::<String, _>("guid"),
        "module_id": row.get::<String, _>("module_id"),
        "difficulty": row.get::<String, _>("difficulty"),
        "question": row.get::<String, _>("question"),
        "description": row.get::<Option<String>, _>("description"),
        "option_a": row.get::<String, _>("option_a"),
        "option_b": row.get::<String, _>("option_b"),
        "option_c": row.get::<String, _>("option_c"),
        "option_d": row.get::<String, _>("option_d"),
        "correct_answer": row.get::<String, _>("correct_answer"),
        "image": row.get::<Option<String>, _>("image"),
    })
}

async fn create_assessment(
    State(state): State<AppState>,
    Json(body): Json<AssessmentBody>,
) -> ApiResult<Json<serde_json::Value>> {
    body.validate()?;
    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO assessments
             (guid, module_id, difficulty, question, description,
              option_a, option_b, option_c, option_d, correct_answer, image, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&guid)
    .bind(&body.module_id)
    .bind(body.difficulty.as_deref().unwrap_or("beginner"))
    .bind(body.question.trim())
    .bind(&body.description)
    .bind(&body.option_a)
    .bind(&body.option_b)
    .bind(&body.option_c)
    .bind(&body.option_d)
    .bind(&body.correct_answer)
    .bind(&body.image)
    .bind(now_ms())
    .execute(&state.db)
    .await?;
    Ok(Json(json!({
        "message": "Assessment created successfully",
        "assessment_id": guid,
    })))
}

async fn list_assessments(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query("SELECT * FROM assessments ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;
    let data: Vec<serde_json::Value> = rows.iter().map(assessment_json).collect();
    Ok(Json(json!({ "data": data })))
}

async fn get_assessment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let row = sqlx::query("SELECT * FROM assessments WHERE guid = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Assessment not found"))?;
    Ok(Json(json!({ "data": assessment_json(&row) })))
}

#[derive(Debug, Deserialize)]
struct ByModuleParams {
    module_id: String,
    #[serde(default)]
    difficulty: Option<String>,
}

async fn by_module(
    State(state): State<AppState>,
    Query(params): Query<ByModuleParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let rows = match &params.difficulty {
        Some(difficulty) => {
            sqlx::query(
                "SELECT * FROM assessments WHERE module_id = ? AND difficulty = ?
                 ORDER BY created_at ASC",
            )
            .bind(&params.module_id)
            .bind(difficulty)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM assessments WHERE module_id = ? ORDER BY created_at ASC")
                .bind(&params.module_id)
                .fetch_all(&state.db)
                .await?
        }
    };
    let data: Vec<serde_json::Value> = rows.iter().map(assessment_json).collect();
    Ok(Json(json!({ "data": data })))
}

async fn update_assessment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AssessmentBody>,
) -> ApiResult<Json<serde_json::Value>> {
    body.validate()?;
    let result = sqlx::query(
        "UPDATE assessments SET
             module_id = ?, difficulty = ?, question = ?, description = ?,
             option_a = ?, option_b = ?, option_c = ?, option_d = ?,
             correct_answer = ?, image = ?
         WHERE guid = ?",
    )
    .bind(&body.module_id)
    .bind(body.difficulty.as_deref().unwrap_or("beginner"))
    .bind(body.question.trim())
    .bind(&body.description)
    .bind(&body.option_a)
    .bind(&body.option_b)
    .bind(&body.option_c)
    .bind(&body.option_d)
    .bind(&body.correct_answer)
    .bind(&body.image)
    .bind(&id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Assessment not found"));
    }
    Ok(Json(json!({ "message": "Assessment updated successfully" })))
}

async fn delete_assessment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM assessments WHERE guid = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Assessment not found"));
    }
    Ok(Json(json!({ "message": "Assessment deleted successfully" })))
}

// ========================================
// Grading
// ========================================

#[derive(Debug, Deserialize)]
struct SubmitBody {
    assessment_id: String,
    selected_answer: String,
}

/// POST /submit: grade one answer and roll it into the caller's
/// per-module/difficulty progress row
async fn submit_answer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<SubmitBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if !ANSWERS.contains(&body.selected_answer.as_str()) {
        return Err(ApiError::invalid("selected_answer must be a, b, c, or d"));
    }
    let row = sqlx::query(
        "SELECT module_id, difficulty, correct_answer FROM assessments WHERE guid = ?",
    )
    .bind(&body.assessment_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Assessment not found"))?;

    let module_id: String = row.get("module_id");
    let difficulty: String = row.get("difficulty");
    let correct_answer: String = row.get("correct_answer");
    let is_correct = body.selected_answer == correct_answer;
    let points_earned = if is_correct { POINTS_PER_CORRECT } else { 0 };

    sqlx::query(
        "INSERT INTO assessment_progress
             (guid, user_id, module_id, difficulty, total_questions, correct_answers, points, created_at)
         VALUES (?, ?, ?, ?, 1, ?, ?, ?)
         ON CONFLICT (user_id, module_id, difficulty) DO UPDATE SET
             total_questions = total_questions + 1,
             correct_answers = correct_answers + excluded.correct_answers,
             points = points + excluded.points",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user.user_id)
    .bind(&module_id)
    .bind(&difficulty)
    .bind(is_correct as i64)
    .bind(points_earned)
    .bind(now_ms())
    .execute(&state.db)
    .await?;

    let progress_id: String = sqlx::query_scalar(
        "SELECT guid FROM assessment_progress
         WHERE user_id = ? AND module_id = ? AND difficulty = ?",
    )
    .bind(&user.user_id)
    .bind(&module_id)
    .bind(&difficulty)
    .fetch_one(&state.db)
    .await?;

    sqlx::query(
        "INSERT INTO assessment_attempts
             (guid, progress_id, assessment_id, selected_answer, is_correct, answered_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&progress_id)
    .bind(&body.assessment_id)
    .bind(&body.selected_answer)
    .bind(is_correct as i64)
    .bind(now_ms())
    .execute(&state.db)
    .await?;

    let total_points: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(points), 0) FROM assessment_progress WHERE user_id = ?",
    )
    .bind(&user.user_id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "is_correct": is_correct,
        "points_earned": points_earned,
        "total_points": total_points,
    })))
}

/// GET /topUsers: leaderboard by summed points
async fn top_users(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query(
        "SELECT p.user_id, u.name, u.email, SUM(p.points) AS total_points
         FROM assessment_progress p
         JOIN users u ON u.guid = p.user_id
         GROUP BY p.user_id
         ORDER BY total_points DESC
         LIMIT ?",
    )
    .bind(LEADERBOARD_SIZE)
    .fetch_all(&state.db)
    .await?;
    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "user_id": r.get::<String, _>("user_id"),
                "name": r.get::<String, _>("name"),
                "email": r.get::<String, _>("email"),
                "total_points": r.get::<i64, _>("total_points"),
            })
        })
        .collect();
    Ok(Json(json!({ "data": data })))
}

/// GET /getUserPoints: summed points for the caller
async fn user_points(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let total_points: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(points), 0) FROM assessment_progress WHERE user_id = ?",
    )
    .bind(&user.user_id)
    .fetch_one(&state.db)
    .await?;
    Ok(Json(json!({ "total_points": total_points })))
}

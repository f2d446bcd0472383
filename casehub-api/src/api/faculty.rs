//! Faculty directory CRUD

use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use casehub_common::time::now_ms;

use crate::error::{is_unique_violation, ApiError, ApiResult};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/get", get(list_faculty))
        .route("/get/:id", get(get_faculty))
        .route("/create", post(create_faculty))
        .route("/update/:id", put(update_faculty))
        .route("/delete/:id", delete(delete_faculty))
}

#[derive(Debug, Deserialize)]
struct FacultyBody {
    name: String,
    email: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

fn faculty_json(row: &SqliteRow) -> serde_json::Value {
    json!({
        "guid": row.get::<String, _>("guid"),
        "name": row.get::<String, _>("name"),
        "title": row.get::<Option<String>, _>("title"),
        "location": row.get::<Option<String>, _>("location"),
        "country": row.get::<Option<String>, _>("country"),
        "email": row.get::<String, _>("email"),
        "phone": row.get::<Option<String>, _>("phone"),
        "description": row.get::<Option<String>, _>("description"),
        "image": row.get::<Option<String>, _>("image"),
    })
}

async fn list_faculty(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query("SELECT * FROM faculty ORDER BY name ASC")
        .fetch_all(&state.db)
        .await?;
    let data: Vec<serde_json::Value> = rows.iter().map(faculty_json).collect();
    Ok(Json(json!({ "data": data })))
}

async fn get_faculty(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let row = sqlx::query("SELECT * FROM faculty WHERE guid = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Faculty not found"))?;
    Ok(Json(json!({ "data": faculty_json(&row) })))
}

async fn create_faculty(
    State(state): State<AppState>,
    Json(body): Json<FacultyBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.name.trim().is_empty() || body.email.trim().is_empty() {
        return Err(ApiError::invalid("name and email are required"));
    }
    let guid = Uuid::new_v4().to_string();
    let result = sqlx::query(
        "INSERT INTO faculty
             (guid, name, title, location, country, email, phone, description, image, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&guid)
    .bind(body.name.trim())
    .bind(&body.title)
    .bind(&body.location)
    .bind(&body.country)
    .bind(body.email.trim())
    .bind(&body.phone)
    .bind(&body.description)
    .bind(&body.image)
    .bind(now_ms())
    .execute(&state.db)
    .await;
    if let Err(err) = result {
        if is_unique_violation(&err) {
            return Err(ApiError::invalid(
                "A faculty member with this email already exists",
            ));
        }
        return Err(err.into());
    }
    Ok(Json(json!({
        "message": "Faculty created successfully",
        "faculty_id": guid,
    })))
}

async fn update_faculty(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<FacultyBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query(
        "UPDATE faculty SET
             name = ?, title = ?, location = ?, country = ?,
             email = ?, phone = ?, description = ?, image = ?
         WHERE guid = ?",
    )
    .bind(body.name.trim())
    .bind(&body.title)
    .bind(&body.location)
    .bind(&body.country)
    .bind(body.email.trim())
    .bind(&body.phone)
    .bind(&body.description)
    .bind(&body.image)
    .bind(&id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Faculty not found"));
    }
    Ok(Json(json!({ "message": "Faculty updated successfully" })))
}

async fn delete_faculty(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM faculty WHERE guid = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Faculty not found"));
    }
    // Drop dangling session links
    sqlx::query("DELETE FROM session_faculty WHERE faculty_guid = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    Ok(Json(json!({ "message": "Faculty deleted successfully" })))
}

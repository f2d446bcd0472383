//! Catalog taxonomy: modules, pathologies, mastery levels, dashboard

use axum::extract::{Path, RawQuery, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use casehub_common::time::now_ms;

use crate::error::{is_unique_violation, ApiError, ApiResult};
use crate::AppState;

/// Sample pathology names shown per module in the overview listing
const SAMPLE_PATHOLOGIES: usize = 3;

pub fn module_routes() -> Router<AppState> {
    Router::new()
        .route("/get", get(list_modules))
        .route("/getWithPathologyCount", get(modules_with_counts))
        .route("/create", post(create_module))
        .route("/update/:id", put(update_module))
}

pub fn pathology_routes() -> Router<AppState> {
    Router::new()
        .route("/get", get(list_pathologies))
        .route("/getByModule", get(pathologies_by_module))
        .route("/create", post(create_pathology))
        .route("/update/:id", put(update_pathology))
}

pub fn mastery_level_routes() -> Router<AppState> {
    Router::new()
        .route("/get", get(list_mastery_levels))
        .route("/create", post(create_mastery_level))
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/getUsers", get(list_users))
}

// ========================================
// Modules
// ========================================

async fn list_modules(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query("SELECT guid, module_name FROM modules ORDER BY module_name ASC")
        .fetch_all(&state.db)
        .await?;
    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "guid": r.get::<String, _>("guid"),
                "module_name": r.get::<String, _>("module_name"),
            })
        })
        .collect();
    Ok(Json(json!({ "data": data })))
}

/// GET /getWithPathologyCount: modules with pathology counts and a few
/// sample names for the overview cards
async fn modules_with_counts(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let modules = sqlx::query(
        "SELECT m.guid, m.module_name, m.description, m.image_url,
                COUNT(p.guid) AS pathology_count
         FROM modules m
         LEFT JOIN pathologies p ON p.module_id = m.guid
         GROUP BY m.guid
         ORDER BY m.module_name ASC",
    )
    .fetch_all(&state.db)
    .await?;

    let mut data = Vec::new();
    for module in &modules {
        let module_id: String = module.get("guid");
        let samples: Vec<(String,)> = sqlx::query_as(
            "SELECT pathology_name FROM pathologies WHERE module_id = ?
             ORDER BY created_at ASC LIMIT ?",
        )
        .bind(&module_id)
        .bind(SAMPLE_PATHOLOGIES as i64)
        .fetch_all(&state.db)
        .await?;
        data.push(json!({
            "guid": module_id,
            "module_name": module.get::<String, _>("module_name"),
            "description": module.get::<Option<String>, _>("description"),
            "image_url": module.get::<Option<String>, _>("image_url"),
            "pathology_count": module.get::<i64, _>("pathology_count"),
            "sample_pathologies": samples.iter().map(|s| s.0.clone()).collect::<Vec<_>>(),
        }));
    }
    Ok(Json(json!({ "data": data })))
}

#[derive(Debug, Deserialize)]
struct ModuleBody {
    module_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

async fn create_module(
    State(state): State<AppState>,
    Json(body): Json<ModuleBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.module_name.trim().is_empty() {
        return Err(ApiError::invalid("module_name is required"));
    }
    let guid = Uuid::new_v4().to_string();
    let result = sqlx::query(
        "INSERT INTO modules (guid, module_name, description, image_url, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&guid)
    .bind(body.module_name.trim())
    .bind(&body.description)
    .bind(&body.image_url)
    .bind(now_ms())
    .execute(&state.db)
    .await;
    if let Err(err) = result {
        if is_unique_violation(&err) {
            return Err(ApiError::invalid("A module with this name already exists"));
        }
        return Err(err.into());
    }
    Ok(Json(json!({
        "message": "Module created successfully",
        "module_id": guid,
    })))
}

async fn update_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ModuleBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query(
        "UPDATE modules SET module_name = ?, description = ?, image_url = ? WHERE guid = ?",
    )
    .bind(body.module_name.trim())
    .bind(&body.description)
    .bind(&body.image_url)
    .bind(&id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Module not found"));
    }
    Ok(Json(json!({ "message": "Module updated successfully" })))
}

// ========================================
// Pathologies
// ========================================

async fn list_pathologies(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query(
        "SELECT guid, pathology_name, description, module_id, image_url
         FROM pathologies ORDER BY pathology_name ASC",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({ "data": pathology_list(&rows) })))
}

fn pathology_list(rows: &[sqlx::sqlite::SqliteRow]) -> Vec<serde_json::Value> {
    rows.iter()
        .map(|r| {
            json!({
                "guid": r.get::<String, _>("guid"),
                "pathology_name": r.get::<String, _>("pathology_name"),
                "description": r.get::<Option<String>, _>("description"),
                "module_id": r.get::<Option<String>, _>("module_id"),
                "image_url": r.get::<Option<String>, _>("image_url"),
            })
        })
        .collect()
}

/// Pull every `module_id` value out of the raw query string. Clients
/// send either repeated params (?module_id=a&module_id=b) or one
/// comma-separated value (?module_id=a,b).
fn module_ids_from_query(query: &str) -> Vec<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| *key == "module_id")
        .flat_map(|(_, value)| value.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

async fn pathologies_by_module(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> ApiResult<Json<serde_json::Value>> {
    let ids = module_ids_from_query(query.as_deref().unwrap_or_default());
    if ids.is_empty() {
        return Err(ApiError::invalid("module_id is required"));
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT guid, pathology_name, description, module_id, image_url
         FROM pathologies WHERE module_id IN ({}) ORDER BY pathology_name ASC",
        placeholders
    );
    let mut query = sqlx::query(&sql);
    for id in &ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(&state.db).await?;
    Ok(Json(json!({ "data": pathology_list(&rows) })))
}

#[derive(Debug, Deserialize)]
struct PathologyBody {
    pathology_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    module_name: Option<String>,
    #[serde(default)]
    module_id: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

async fn create_pathology(
    State(state): State<AppState>,
    Json(body): Json<PathologyBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.pathology_name.trim().is_empty() {
        return Err(ApiError::invalid("pathology_name is required"));
    }

    // Resolve the owning module by id or by name
    let module_id = match (&body.module_id, &body.module_name) {
        (Some(id), _) => Some(id.clone()),
        (None, Some(name)) => {
            sqlx::query_scalar("SELECT guid FROM modules WHERE module_name = ?")
                .bind(name)
                .fetch_optional(&state.db)
                .await?
        }
        (None, None) => None,
    };

    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO pathologies (guid, pathology_name, description, module_id, image_url, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&guid)
    .bind(body.pathology_name.trim())
    .bind(&body.description)
    .bind(&module_id)
    .bind(&body.image_url)
    .bind(now_ms())
    .execute(&state.db)
    .await?;

    Ok(Json(json!({
        "message": "Pathology created successfully",
        "pathology_id": guid,
    })))
}

async fn update_pathology(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PathologyBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query(
        "UPDATE pathologies SET pathology_name = ?, description = ?, module_id = ?, image_url = ?
         WHERE guid = ?",
    )
    .bind(body.pathology_name.trim())
    .bind(&body.description)
    .bind(&body.module_id)
    .bind(&body.image_url)
    .bind(&id)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Pathology not found"));
    }
    Ok(Json(json!({ "message": "Pathology updated successfully" })))
}

// ========================================
// Mastery levels
// ========================================

async fn list_mastery_levels(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query(
        "SELECT guid, level_name, description, points FROM mastery_levels ORDER BY points ASC",
    )
    .fetch_all(&state.db)
    .await?;
    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "guid": r.get::<String, _>("guid"),
                "level_name": r.get::<String, _>("level_name"),
                "description": r.get::<Option<String>, _>("description"),
                "points": r.get::<i64, _>("points"),
            })
        })
        .collect();
    Ok(Json(json!({ "data": data })))
}

#[derive(Debug, Deserialize)]
struct MasteryLevelBody {
    level_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    points: i64,
}

async fn create_mastery_level(
    State(state): State<AppState>,
    Json(body): Json<MasteryLevelBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.level_name.trim().is_empty() {
        return Err(ApiError::invalid("level_name is required"));
    }
    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO mastery_levels (guid, level_name, description, points, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&guid)
    .bind(body.level_name.trim())
    .bind(&body.description)
    .bind(body.points)
    .bind(now_ms())
    .execute(&state.db)
    .await?;
    Ok(Json(json!({
        "message": "Mastery level created successfully",
        "mastery_level_id": guid,
    })))
}


// ========================================
// Dashboard
// ========================================

async fn list_users(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query(
        "SELECT guid, email, name, mobile_number, designation, role, created_at
         FROM users ORDER BY created_at DESC",
    )
    .fetch_all(&state.db)
    .await?;
    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "guid": r.get::<String, _>("guid"),
                "email": r.get::<String, _>("email"),
                "name": r.get::<String, _>("name"),
                "mobile_number": r.get::<String, _>("mobile_number"),
                "designation": r.get::<Option<String>, _>("designation"),
                "role": r.get::<String, _>("role"),
                "created_at": r.get::<i64, _>("created_at"),
            })
        })
        .collect();
    Ok(Json(json!({ "data": data })))
}

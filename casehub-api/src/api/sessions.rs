//! Session catalog endpoints
//!
//! Listing endpoints run through the optional-auth middleware so tiered
//! access control can gate the page; mutation endpoints require a token.

use axum::extract::{Extension, Path, Query, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use casehub_common::time::now_ms;

use crate::access::{apply_access_control, GatedSession, UserAccess};
use crate::api::middleware::CurrentUser;
use crate::db::sessions::{self, SessionKind, SessionRecord};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{page_slice, paginate, PageQuery, DEFAULT_PAGE_SIZE};
use crate::{protected, with_optional_access, AppState};

const RECENT_CASES: i64 = 8;
const RECENT_LECTURES: i64 = 7;
const RECENT_LIVE: i64 = 5;
const TOP_RATED_LECTURES: i64 = 12;
const TOP_WATCHED: i64 = 15;
const UPCOMING_LIVE: i64 = 10;

pub fn routes(state: AppState) -> Router<AppState> {
    let listing = with_optional_access(
        Router::new()
            .route("/get", get(list_sessions))
            .route("/getRecentItems", get(recent_items))
            .route("/getTopRatedCases", get(top_rated_cases))
            .route("/getTopRatedLectures", get(top_rated_lectures))
            .route("/getUpcomingLivePrograms", get(upcoming_live_programs))
            .route("/getTopWatchedSessions", get(top_watched_sessions)),
        &state,
    );
    let mutating = protected(
        Router::new()
            .route("/create", post(create_session))
            .route("/update", put(update_session))
            .route("/delete", delete(delete_session))
            .route(
                "/updateFaculties/:session_id/:session_type",
                put(update_faculties),
            )
            .route("/track", post(track_view))
            .route("/getWatchedSessions", get(watched_sessions)),
        &state,
    );
    listing.merge(mutating)
}

// ========================================
// Create / update payload
// ========================================

#[derive(Debug, Deserialize)]
pub struct SessionPayload {
    pub session_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub pathology_name: Option<String>,
    #[serde(default)]
    pub pathology_id: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub is_assessment: bool,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub sponsored: bool,
    #[serde(default)]
    pub resource_links: Option<String>,
    #[serde(default)]
    pub image_url_1920x1080: Option<String>,
    #[serde(default)]
    pub image_url_522x760: Option<String>,
    #[serde(default)]
    pub start_date: Option<i64>,
    #[serde(default)]
    pub end_date: Option<i64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub faculty: Vec<String>,

    // DICOM case fields
    #[serde(default)]
    pub dicom_study_id: Option<String>,
    #[serde(default)]
    pub dicom_case_id: Option<String>,
    #[serde(default)]
    pub dicom_case_video_url: Option<String>,
    #[serde(default)]
    pub case_access_type: Option<String>,

    // Recorded lecture fields
    #[serde(default)]
    pub session_duration: Option<String>,
    #[serde(default)]
    pub vimeo_video_id: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub video_type: Option<String>,

    // Live program fields
    #[serde(default)]
    pub live_kind: Option<String>,
    #[serde(default)]
    pub zoom_meeting_id: Option<String>,
    #[serde(default)]
    pub zoom_password: Option<String>,
    #[serde(default)]
    pub zoom_join_url: Option<String>,
    #[serde(default)]
    pub zoom_backup_link: Option<String>,
    #[serde(default)]
    pub vimeo_live_url: Option<String>,
}

const DIFFICULTIES: [&str; 3] = ["beginner", "intermediate", "advanced"];

impl SessionPayload {
    /// Validate and lower into a record with the given guid/timestamp
    fn into_record(self, guid: String, created_at: i64) -> ApiResult<SessionRecord> {
        let Some(kind) = SessionKind::parse(&self.session_type) else {
            return Err(ApiError::invalid(
                "session_type must be one of Dicom, Vimeo, Live",
            ));
        };
        if self.title.trim().is_empty() {
            return Err(ApiError::invalid("Title is required"));
        }
        if let Some(difficulty) = &self.difficulty {
            if !DIFFICULTIES.contains(&difficulty.as_str()) {
                return Err(ApiError::invalid(
                    "difficulty must be beginner, intermediate, or advanced",
                ));
            }
        }
        if kind == SessionKind::Live {
            if self.start_date.is_none() || self.end_date.is_none() {
                return Err(ApiError::invalid(
                    "Live programs require start_date and end_date",
                ));
            }
            if let Some(live_kind) = &self.live_kind {
                if live_kind != "Zoom" && live_kind != "Vimeo" {
                    return Err(ApiError::invalid("live_kind must be Zoom or Vimeo"));
                }
            }
        }

        let mut record = SessionRecord::blank(kind, guid, self.title.trim().to_string(), created_at);
        if let Some(difficulty) = self.difficulty {
            record.difficulty = difficulty;
        }
        record.description = self.description;
        record.module_name = self.module_name;
        record.pathology_name = self.pathology_name;
        record.pathology_id = self.pathology_id;
        record.is_assessment = self.is_assessment;
        record.is_free = self.is_free;
        record.sponsored = self.sponsored;
        record.resource_links = self.resource_links;
        record.image_url_1920x1080 = self.image_url_1920x1080;
        record.image_url_522x760 = self.image_url_522x760;
        record.start_date = self.start_date;
        record.end_date = self.end_date;
        record.start_time = self.start_time;
        record.end_time = self.end_time;
        record.dicom_study_id = self.dicom_study_id;
        record.dicom_case_id = self.dicom_case_id;
        record.dicom_case_video_url = self.dicom_case_video_url;
        record.case_access_type = self.case_access_type;
        record.session_duration = self.session_duration;
        record.vimeo_video_id = self.vimeo_video_id;
        record.video_url = self.video_url;
        record.video_type = self.video_type;
        record.live_kind = self.live_kind;
        record.zoom_meeting_id = self.zoom_meeting_id;
        record.zoom_password = self.zoom_password;
        record.zoom_join_url = self.zoom_join_url;
        record.zoom_backup_link = self.zoom_backup_link;
        record.vimeo_live_url = self.vimeo_live_url;
        Ok(record)
    }
}

// ========================================
// CRUD
// ========================================

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<SessionPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    let faculty = body.faculty.clone();
    let record = body.into_record(Uuid::new_v4().to_string(), now_ms())?;
    sessions::insert(&state.db, &record).await?;
    if !faculty.is_empty() {
        sessions::replace_faculty(&state.db, &record.guid, &faculty).await?;
    }
    tracing::info!(
        "Created {} session {}",
        record.session_type.as_str(),
        record.guid
    );
    Ok(Json(json!({
        "message": "Session created successfully",
        "session_id": record.guid,
    })))
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    session_type: String,
    id: String,
}

async fn update_session(
    State(state): State<AppState>,
    Query(params): Query<UpdateParams>,
    Json(mut body): Json<SessionPayload>,
) -> ApiResult<Json<serde_json::Value>> {
    body.session_type = params.session_type;
    let faculty = body.faculty.clone();
    let record = body.into_record(params.id.clone(), 0)?;
    if !sessions::update(&state.db, &params.id, &record).await? {
        return Err(ApiError::not_found("Session not found"));
    }
    if !faculty.is_empty() {
        sessions::replace_faculty(&state.db, &params.id, &faculty).await?;
    }
    Ok(Json(json!({ "message": "Session updated successfully" })))
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    session_id: String,
    session_type: String,
}

async fn delete_session(
    State(state): State<AppState>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let Some(kind) = SessionKind::parse(&params.session_type) else {
        return Err(ApiError::invalid("Unknown session_type"));
    };
    if !sessions::delete(&state.db, kind, &params.session_id).await? {
        return Err(ApiError::not_found("Session not found"));
    }
    Ok(Json(json!({ "message": "Session deleted successfully" })))
}

#[derive(Debug, Deserialize)]
struct FacultyBody {
    faculty: Vec<String>,
}

async fn update_faculties(
    State(state): State<AppState>,
    Path((session_id, session_type)): Path<(String, String)>,
    Json(body): Json<FacultyBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let Some(kind) = SessionKind::parse(&session_type) else {
        return Err(ApiError::invalid("Unknown session_type"));
    };
    if sessions::fetch_by_id(&state.db, kind, &session_id)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found("Session not found"));
    }
    sessions::replace_faculty(&state.db, &session_id, &body.faculty).await?;
    Ok(Json(json!({ "message": "Faculty updated successfully" })))
}

// ========================================
// Listings
// ========================================

// Query deserialization cannot flatten PageQuery here (serde_urlencoded
// buffers flattened fields as strings), so page/limit are inlined.
#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    session_type: Option<String>,
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PagedResponse {
    data: Vec<GatedSession>,
    page: i64,
    limit: i64,
    total: i64,
}

/// GET /get: one table paged in SQL, or the three-table merge for "All"
async fn list_sessions(
    State(state): State<AppState>,
    Extension(access): Extension<UserAccess>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<PagedResponse>> {
    let query = PageQuery {
        page: params.page.unwrap_or(1),
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    };
    let window = paginate(&query);
    let type_name = params.session_type.as_deref().unwrap_or("All");

    let (records, total) = if type_name == "All" {
        let merged = sessions::fetch_all_merged(&state.db).await?;
        let total = merged.len() as i64;
        (page_slice(merged, window), total)
    } else {
        let Some(kind) = SessionKind::parse(type_name) else {
            return Err(ApiError::invalid("Unknown session_type"));
        };
        let total = sessions::count(&state.db, kind).await?;
        let page = sessions::fetch_page(&state.db, kind, window.limit, window.offset).await?;
        (page, total)
    };

    let gated = apply_access_control(records, &access, state.config.access.free_session_limit);
    Ok(Json(PagedResponse {
        data: gated,
        page: window.page,
        limit: window.limit,
        total,
    }))
}

/// GET /getRecentItems: newest cases + lectures + live merged
async fn recent_items(
    State(state): State<AppState>,
    Extension(access): Extension<UserAccess>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut merged = Vec::new();
    merged.extend(sessions::fetch_recent(&state.db, SessionKind::Dicom, RECENT_CASES).await?);
    merged.extend(sessions::fetch_recent(&state.db, SessionKind::Vimeo, RECENT_LECTURES).await?);
    merged.extend(sessions::fetch_recent(&state.db, SessionKind::Live, RECENT_LIVE).await?);
    sessions::sort_newest_first(&mut merged);

    let gated = apply_access_control(merged, &access, state.config.access.free_session_limit);
    Ok(Json(json!({ "data": gated })))
}

#[derive(Debug, Deserialize)]
struct LimitParam {
    #[serde(default)]
    limit: Option<String>,
}

/// GET /getTopRatedCases: newest cases; `limit` is a count or "All"
async fn top_rated_cases(
    State(state): State<AppState>,
    Extension(access): Extension<UserAccess>,
    Query(params): Query<LimitParam>,
) -> ApiResult<Json<serde_json::Value>> {
    let records = match params.limit.as_deref() {
        Some("All") | None => sessions::fetch_all_merged_of(&state.db, SessionKind::Dicom).await?,
        Some(n) => {
            let limit: i64 = n
                .parse()
                .map_err(|_| ApiError::invalid("limit must be a number or All"))?;
            sessions::fetch_recent(&state.db, SessionKind::Dicom, limit).await?
        }
    };
    let gated = apply_access_control(records, &access, state.config.access.free_session_limit);
    Ok(Json(json!({ "data": gated })))
}

/// GET /getTopRatedLectures: newest lectures, fixed window
async fn top_rated_lectures(
    State(state): State<AppState>,
    Extension(access): Extension<UserAccess>,
) -> ApiResult<Json<serde_json::Value>> {
    let records = sessions::fetch_recent(&state.db, SessionKind::Vimeo, TOP_RATED_LECTURES).await?;
    let gated = apply_access_control(records, &access, state.config.access.free_session_limit);
    Ok(Json(json!({ "data": gated })))
}

/// GET /getUpcomingLivePrograms: soonest-first future programs
async fn upcoming_live_programs(
    State(state): State<AppState>,
    Extension(access): Extension<UserAccess>,
) -> ApiResult<Json<serde_json::Value>> {
    let records = sessions::fetch_upcoming_live(&state.db, now_ms(), UPCOMING_LIVE).await?;
    let gated = apply_access_control(records, &access, state.config.access.free_session_limit);
    Ok(Json(json!({ "data": gated })))
}

#[derive(Debug, Serialize)]
struct WatchedEntry {
    #[serde(flatten)]
    session: GatedSession,
    total_views: i64,
}

/// GET /getTopWatchedSessions: view-count leaders, order preserved
async fn top_watched_sessions(
    State(state): State<AppState>,
    Extension(access): Extension<UserAccess>,
) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query(
        "SELECT session_id, SUM(view_count) AS total_views
         FROM session_views
         GROUP BY session_id
         ORDER BY total_views DESC
         LIMIT ?",
    )
    .bind(TOP_WATCHED)
    .fetch_all(&state.db)
    .await?;

    let ranking: Vec<(String, i64)> = rows
        .iter()
        .map(|r| (r.get::<String, _>(0), r.get::<i64, _>(1)))
        .collect();
    let ids: Vec<String> = ranking.iter().map(|(id, _)| id.clone()).collect();

    let mut found = sessions::fetch_by_ids_any(&state.db, &ids).await?;
    // Ids whose session was deleted drop out; surviving records keep
    // the view-count ranking order.
    found.sort_by_key(|record| {
        ranking
            .iter()
            .position(|(id, _)| *id == record.guid)
            .unwrap_or(usize::MAX)
    });

    let views: std::collections::HashMap<String, i64> = ranking.into_iter().collect();
    let view_for = |guid: &str| views.get(guid).copied().unwrap_or(0);

    let gated = apply_access_control(found, &access, state.config.access.free_session_limit);
    let data: Vec<WatchedEntry> = gated
        .into_iter()
        .map(|session| WatchedEntry {
            total_views: view_for(session.guid()),
            session,
        })
        .collect();
    Ok(Json(json!({ "data": data })))
}

// ========================================
// View tracking / watch history
// ========================================

#[derive(Debug, Deserialize)]
struct TrackBody {
    session_id: String,
    #[serde(default)]
    is_completed: bool,
}

/// POST /track: bump the caller's view counter for a session
async fn track_view(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<TrackBody>,
) -> ApiResult<Json<serde_json::Value>> {
    sqlx::query(
        "INSERT INTO session_views (guid, user_id, session_id, view_count, is_completed, last_viewed_at)
         VALUES (?, ?, ?, 1, ?, ?)
         ON CONFLICT (user_id, session_id) DO UPDATE SET
             view_count = view_count + 1,
             is_completed = excluded.is_completed,
             last_viewed_at = excluded.last_viewed_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&user.user_id)
    .bind(&body.session_id)
    .bind(body.is_completed as i64)
    .bind(now_ms())
    .execute(&state.db)
    .await?;
    Ok(Json(json!({ "message": "View tracked" })))
}

#[derive(Debug, Deserialize)]
struct WatchedParams {
    #[serde(default)]
    session_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct WatchedSession {
    #[serde(flatten)]
    session: SessionRecord,
    playback_progress: PlaybackState,
}

#[derive(Debug, Serialize)]
struct PlaybackState {
    current_time: f64,
    last_watched_at: i64,
}

/// GET /getWatchedSessions: the caller's watch history, newest first
async fn watched_sessions(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<WatchedParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let kind_filter = match params.session_type.as_deref() {
        Some(name) => match SessionKind::parse(name) {
            Some(kind) => Some(kind),
            None => return Err(ApiError::invalid("Unknown session_type")),
        },
        None => None,
    };

    let rows = sqlx::query(
        "SELECT session_id, session_kind, current_time_secs, last_watched_at
         FROM playback_progress
         WHERE user_id = ?
         ORDER BY last_watched_at DESC",
    )
    .bind(&user.user_id)
    .fetch_all(&state.db)
    .await?;

    let mut data = Vec::new();
    for row in &rows {
        let kind_label: String = row.get("session_kind");
        let Some(kind) = SessionKind::from_progress_label(&kind_label) else {
            continue;
        };
        if let Some(filter) = kind_filter {
            if kind != filter {
                continue;
            }
        }
        let session_id: String = row.get("session_id");
        // Deleted sessions leave stale rows behind; skip them
        let Some(session) = sessions::fetch_by_id(&state.db, kind, &session_id).await? else {
            continue;
        };
        data.push(WatchedSession {
            session,
            playback_progress: PlaybackState {
                current_time: row.get("current_time_secs"),
                last_watched_at: row.get("last_watched_at"),
            },
        });
    }
    Ok(Json(json!({ "data": data })))
}

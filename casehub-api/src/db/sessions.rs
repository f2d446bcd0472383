//! Session catalog queries
//!
//! DICOM cases, recorded lectures, and live programs live in three
//! independent tables but are exposed through one unified `SessionRecord`
//! shape. Listing "All" fetches every table, merges, and sorts newest-first
//! in memory; the caller paginates the merged list.

use casehub_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Which table a session lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    Dicom,
    Vimeo,
    Live,
}

impl SessionKind {
    /// Parse the API discriminator ("Dicom" / "Vimeo" / "Live")
    pub fn parse(s: &str) -> Option<SessionKind> {
        match s.trim() {
            "Dicom" => Some(SessionKind::Dicom),
            "Vimeo" => Some(SessionKind::Vimeo),
            "Live" => Some(SessionKind::Live),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Dicom => "Dicom",
            SessionKind::Vimeo => "Vimeo",
            SessionKind::Live => "Live",
        }
    }

    /// Label used by playback-progress rows ("DicomCase" etc.)
    pub fn progress_label(&self) -> &'static str {
        match self {
            SessionKind::Dicom => "DicomCase",
            SessionKind::Vimeo => "RecordedLecture",
            SessionKind::Live => "LiveProgram",
        }
    }

    pub fn from_progress_label(s: &str) -> Option<SessionKind> {
        match s {
            "DicomCase" => Some(SessionKind::Dicom),
            "RecordedLecture" => Some(SessionKind::Vimeo),
            "LiveProgram" => Some(SessionKind::Live),
            _ => None,
        }
    }

    fn table(&self) -> &'static str {
        match self {
            SessionKind::Dicom => "dicom_cases",
            SessionKind::Vimeo => "recorded_lectures",
            SessionKind::Live => "live_programs",
        }
    }
}

/// Faculty fields embedded in session responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacultyCard {
    pub guid: String,
    pub name: String,
    pub image: Option<String>,
}

/// One session from any of the three tables, flattened to a common shape.
/// Kind-specific fields are `None` for the other kinds and omitted from
/// serialized output.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub guid: String,
    pub session_type: SessionKind,
    pub title: String,
    pub description: Option<String>,
    pub module_name: Option<String>,
    pub pathology_name: Option<String>,
    pub pathology_id: Option<String>,
    pub difficulty: String,
    pub is_assessment: bool,
    pub is_free: bool,
    pub sponsored: bool,
    pub resource_links: Option<String>,
    pub image_url_1920x1080: Option<String>,
    pub image_url_522x760: Option<String>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub created_at: i64,
    pub faculty: Vec<FacultyCard>,

    // DICOM case fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dicom_study_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dicom_case_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dicom_case_video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_access_type: Option<String>,

    // Recorded lecture fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vimeo_video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_type: Option<String>,

    // Live program fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_meeting_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_join_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_backup_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vimeo_live_url: Option<String>,
}

impl SessionRecord {
    /// Empty record of a given kind; callers fill in the fields they have
    pub fn blank(kind: SessionKind, guid: String, title: String, created_at: i64) -> SessionRecord {
        SessionRecord {
            guid,
            session_type: kind,
            title,
            description: None,
            module_name: None,
            pathology_name: None,
            pathology_id: None,
            difficulty: match kind {
                SessionKind::Dicom => "intermediate".to_string(),
                _ => "beginner".to_string(),
            },
            is_assessment: false,
            is_free: false,
            sponsored: false,
            resource_links: None,
            image_url_1920x1080: None,
            image_url_522x760: None,
            start_date: None,
            end_date: None,
            start_time: None,
            end_time: None,
            created_at,
            faculty: Vec::new(),
            dicom_study_id: None,
            dicom_case_id: None,
            dicom_case_video_url: None,
            case_access_type: None,
            session_duration: None,
            vimeo_video_id: None,
            video_url: None,
            video_type: None,
            live_kind: None,
            zoom_meeting_id: None,
            zoom_password: None,
            zoom_join_url: None,
            zoom_backup_link: None,
            vimeo_live_url: None,
        }
    }
}

// ========================================
// Row mapping
// ========================================

fn common_from_row(kind: SessionKind, row: &SqliteRow) -> SessionRecord {
    let mut record = SessionRecord::blank(
        kind,
        row.get::<String, _>("guid"),
        row.get::<String, _>("title"),
        row.get::<i64, _>("created_at"),
    );
    record.description = row.get("description");
    record.module_name = row.get("module_name");
    record.pathology_name = row.get("pathology_name");
    record.pathology_id = row.get("pathology_id");
    record.difficulty = row.get("difficulty");
    record.is_free = row.get::<i64, _>("is_free") != 0;
    record.sponsored = row.get::<i64, _>("sponsored") != 0;
    record.resource_links = row.get("resource_links");
    record.image_url_1920x1080 = row.get("image_url_1920x1080");
    record.image_url_522x760 = row.get("image_url_522x760");
    record.start_date = row.get("start_date");
    record.end_date = row.get("end_date");
    record.start_time = row.get("start_time");
    record.end_time = row.get("end_time");
    record
}

fn dicom_from_row(row: &SqliteRow) -> SessionRecord {
    let mut record = common_from_row(SessionKind::Dicom, row);
    record.is_assessment = row.get::<i64, _>("is_assessment") != 0;
    record.dicom_study_id = row.get("dicom_study_id");
    record.dicom_case_id = row.get("dicom_case_id");
    record.dicom_case_video_url = row.get("dicom_case_video_url");
    record.case_access_type = row.get("case_access_type");
    record
}

fn lecture_from_row(row: &SqliteRow) -> SessionRecord {
    let mut record = common_from_row(SessionKind::Vimeo, row);
    record.is_assessment = row.get::<i64, _>("is_assessment") != 0;
    record.session_duration = row.get("session_duration");
    record.vimeo_video_id = row.get("vimeo_video_id");
    record.video_url = row.get("video_url");
    record.video_type = row.get("video_type");
    record
}

fn live_from_row(row: &SqliteRow) -> SessionRecord {
    let mut record = common_from_row(SessionKind::Live, row);
    record.live_kind = row.get("live_kind");
    record.zoom_meeting_id = row.get("zoom_meeting_id");
    record.zoom_password = row.get("zoom_password");
    record.zoom_join_url = row.get("zoom_join_url");
    record.zoom_backup_link = row.get("zoom_backup_link");
    record.vimeo_video_id = row.get("vimeo_video_id");
    record.vimeo_live_url = row.get("vimeo_live_url");
    record
}

fn map_row(kind: SessionKind, row: &SqliteRow) -> SessionRecord {
    match kind {
        SessionKind::Dicom => dicom_from_row(row),
        SessionKind::Vimeo => lecture_from_row(row),
        SessionKind::Live => live_from_row(row),
    }
}

// ========================================
// Writes
// ========================================

/// Insert a session into the table matching its kind
pub async fn insert(db: &SqlitePool, record: &SessionRecord) -> Result<()> {
    match record.session_type {
        SessionKind::Dicom => {
            sqlx::query(
                r#"
                INSERT INTO dicom_cases
                    (guid, title, description, module_name, pathology_name, pathology_id,
                     difficulty, is_assessment, is_free, sponsored,
                     dicom_study_id, dicom_case_id, dicom_case_video_url, case_access_type,
                     resource_links, image_url_1920x1080, image_url_522x760,
                     start_date, end_date, start_time, end_time, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.guid)
            .bind(&record.title)
            .bind(&record.description)
            .bind(&record.module_name)
            .bind(&record.pathology_name)
            .bind(&record.pathology_id)
            .bind(&record.difficulty)
            .bind(record.is_assessment as i64)
            .bind(record.is_free as i64)
            .bind(record.sponsored as i64)
            .bind(&record.dicom_study_id)
            .bind(&record.dicom_case_id)
            .bind(&record.dicom_case_video_url)
            .bind(record.case_access_type.as_deref().unwrap_or("free"))
            .bind(&record.resource_links)
            .bind(&record.image_url_1920x1080)
            .bind(&record.image_url_522x760)
            .bind(record.start_date)
            .bind(record.end_date)
            .bind(&record.start_time)
            .bind(&record.end_time)
            .bind(record.created_at)
            .execute(db)
            .await?;
        }
        SessionKind::Vimeo => {
            sqlx::query(
                r#"
                INSERT INTO recorded_lectures
                    (guid, title, description, module_name, pathology_name, pathology_id,
                     difficulty, is_assessment, is_free, sponsored,
                     session_duration, vimeo_video_id, video_url, video_type,
                     resource_links, image_url_1920x1080, image_url_522x760,
                     start_date, end_date, start_time, end_time, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.guid)
            .bind(&record.title)
            .bind(&record.description)
            .bind(record.module_name.as_deref().unwrap_or_default())
            .bind(&record.pathology_name)
            .bind(&record.pathology_id)
            .bind(&record.difficulty)
            .bind(record.is_assessment as i64)
            .bind(record.is_free as i64)
            .bind(record.sponsored as i64)
            .bind(&record.session_duration)
            .bind(&record.vimeo_video_id)
            .bind(&record.video_url)
            .bind(&record.video_type)
            .bind(&record.resource_links)
            .bind(&record.image_url_1920x1080)
            .bind(&record.image_url_522x760)
            .bind(record.start_date)
            .bind(record.end_date)
            .bind(&record.start_time)
            .bind(&record.end_time)
            .bind(record.created_at)
            .execute(db)
            .await?;
        }
        SessionKind::Live => {
            sqlx::query(
                r#"
                INSERT INTO live_programs
                    (guid, title, description, module_name, pathology_name, pathology_id,
                     difficulty, is_free, sponsored, live_kind,
                     zoom_meeting_id, zoom_password, zoom_join_url, zoom_backup_link,
                     vimeo_video_id, vimeo_live_url,
                     resource_links, image_url_1920x1080, image_url_522x760,
                     start_date, end_date, start_time, end_time, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.guid)
            .bind(&record.title)
            .bind(&record.description)
            .bind(record.module_name.as_deref().unwrap_or_default())
            .bind(&record.pathology_name)
            .bind(&record.pathology_id)
            .bind(&record.difficulty)
            .bind(record.is_free as i64)
            .bind(record.sponsored as i64)
            .bind(record.live_kind.as_deref().unwrap_or("Zoom"))
            .bind(&record.zoom_meeting_id)
            .bind(&record.zoom_password)
            .bind(&record.zoom_join_url)
            .bind(&record.zoom_backup_link)
            .bind(&record.vimeo_video_id)
            .bind(&record.vimeo_live_url)
            .bind(&record.resource_links)
            .bind(&record.image_url_1920x1080)
            .bind(&record.image_url_522x760)
            .bind(record.start_date.unwrap_or(record.created_at))
            .bind(record.end_date.unwrap_or(record.created_at))
            .bind(&record.start_time)
            .bind(&record.end_time)
            .bind(record.created_at)
            .execute(db)
            .await?;
        }
    }
    Ok(())
}

/// Full-record update; returns false when no row matched
pub async fn update(db: &SqlitePool, guid: &str, record: &SessionRecord) -> Result<bool> {
    let result = match record.session_type {
        SessionKind::Dicom => {
            sqlx::query(
                r#"
                UPDATE dicom_cases SET
                    title = ?, description = ?, module_name = ?, pathology_name = ?,
                    pathology_id = ?, difficulty = ?, is_assessment = ?, is_free = ?,
                    sponsored = ?, dicom_study_id = ?, dicom_case_id = ?,
                    dicom_case_video_url = ?, case_access_type = ?, resource_links = ?,
                    image_url_1920x1080 = ?, image_url_522x760 = ?,
                    start_date = ?, end_date = ?, start_time = ?, end_time = ?
                WHERE guid = ?
                "#,
            )
            .bind(&record.title)
            .bind(&record.description)
            .bind(&record.module_name)
            .bind(&record.pathology_name)
            .bind(&record.pathology_id)
            .bind(&record.difficulty)
            .bind(record.is_assessment as i64)
            .bind(record.is_free as i64)
            .bind(record.sponsored as i64)
            .bind(&record.dicom_study_id)
            .bind(&record.dicom_case_id)
            .bind(&record.dicom_case_video_url)
            .bind(record.case_access_type.as_deref().unwrap_or("free"))
            .bind(&record.resource_links)
            .bind(&record.image_url_1920x1080)
            .bind(&record.image_url_522x760)
            .bind(record.start_date)
            .bind(record.end_date)
            .bind(&record.start_time)
            .bind(&record.end_time)
            .bind(guid)
            .execute(db)
            .await?
        }
        SessionKind::Vimeo => {
            sqlx::query(
                r#"
                UPDATE recorded_lectures SET
                    title = ?, description = ?, module_name = ?, pathology_name = ?,
                    pathology_id = ?, difficulty = ?, is_assessment = ?, is_free = ?,
                    sponsored = ?, session_duration = ?, vimeo_video_id = ?,
                    video_url = ?, video_type = ?, resource_links = ?,
                    image_url_1920x1080 = ?, image_url_522x760 = ?,
                    start_date = ?, end_date = ?, start_time = ?, end_time = ?
                WHERE guid = ?
                "#,
            )
            .bind(&record.title)
            .bind(&record.description)
            .bind(record.module_name.as_deref().unwrap_or_default())
            .bind(&record.pathology_name)
            .bind(&record.pathology_id)
            .bind(&record.difficulty)
            .bind(record.is_assessment as i64)
            .bind(record.is_free as i64)
            .bind(record.sponsored as i64)
            .bind(&record.session_duration)
            .bind(&record.vimeo_video_id)
            .bind(&record.video_url)
            .bind(&record.video_type)
            .bind(&record.resource_links)
            .bind(&record.image_url_1920x1080)
            .bind(&record.image_url_522x760)
            .bind(record.start_date)
            .bind(record.end_date)
            .bind(&record.start_time)
            .bind(&record.end_time)
            .bind(guid)
            .execute(db)
            .await?
        }
        SessionKind::Live => {
            sqlx::query(
                r#"
                UPDATE live_programs SET
                    title = ?, description = ?, module_name = ?, pathology_name = ?,
                    pathology_id = ?, difficulty = ?, is_free = ?, sponsored = ?,
                    live_kind = ?, zoom_meeting_id = ?, zoom_password = ?,
                    zoom_join_url = ?, zoom_backup_link = ?, vimeo_video_id = ?,
                    vimeo_live_url = ?, resource_links = ?,
                    image_url_1920x1080 = ?, image_url_522x760 = ?,
                    start_date = ?, end_date = ?, start_time = ?, end_time = ?
                WHERE guid = ?
                "#,
            )
            .bind(&record.title)
            .bind(&record.description)
            .bind(record.module_name.as_deref().unwrap_or_default())
            .bind(&record.pathology_name)
            .bind(&record.pathology_id)
            .bind(&record.difficulty)
            .bind(record.is_free as i64)
            .bind(record.sponsored as i64)
            .bind(record.live_kind.as_deref().unwrap_or("Zoom"))
            .bind(&record.zoom_meeting_id)
            .bind(&record.zoom_password)
            .bind(&record.zoom_join_url)
            .bind(&record.zoom_backup_link)
            .bind(&record.vimeo_video_id)
            .bind(&record.vimeo_live_url)
            .bind(&record.resource_links)
            .bind(&record.image_url_1920x1080)
            .bind(&record.image_url_522x760)
            .bind(record.start_date)
            .bind(record.end_date)
            .bind(&record.start_time)
            .bind(&record.end_time)
            .bind(guid)
            .execute(db)
            .await?
        }
    };
    Ok(result.rows_affected() > 0)
}

/// Delete a session; returns false when no row matched
pub async fn delete(db: &SqlitePool, kind: SessionKind, guid: &str) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE guid = ?", kind.table());
    let result = sqlx::query(&sql).bind(guid).execute(db).await?;

    // Faculty links are orphaned otherwise
    sqlx::query("DELETE FROM session_faculty WHERE session_guid = ?")
        .bind(guid)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Replace the faculty links of a session
pub async fn replace_faculty(db: &SqlitePool, session_guid: &str, faculty: &[String]) -> Result<()> {
    sqlx::query("DELETE FROM session_faculty WHERE session_guid = ?")
        .bind(session_guid)
        .execute(db)
        .await?;
    for faculty_guid in faculty {
        sqlx::query(
            "INSERT OR IGNORE INTO session_faculty (session_guid, faculty_guid) VALUES (?, ?)",
        )
        .bind(session_guid)
        .bind(faculty_guid)
        .execute(db)
        .await?;
    }
    Ok(())
}

// ========================================
// Reads
// ========================================

pub async fn count(db: &SqlitePool, kind: SessionKind) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
    let total: i64 = sqlx::query_scalar(&sql).fetch_one(db).await?;
    Ok(total)
}

/// One page of a single table, newest first, faculty attached
pub async fn fetch_page(
    db: &SqlitePool,
    kind: SessionKind,
    limit: i64,
    offset: i64,
) -> Result<Vec<SessionRecord>> {
    let sql = format!(
        "SELECT * FROM {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        kind.table()
    );
    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
    let mut records: Vec<SessionRecord> = rows.iter().map(|r| map_row(kind, r)).collect();
    attach_faculty(db, &mut records).await?;
    Ok(records)
}

/// The newest `limit` rows of a single table
pub async fn fetch_recent(db: &SqlitePool, kind: SessionKind, limit: i64) -> Result<Vec<SessionRecord>> {
    fetch_page(db, kind, limit, 0).await
}

/// Every row of one table, newest first
pub async fn fetch_all_merged_of(db: &SqlitePool, kind: SessionKind) -> Result<Vec<SessionRecord>> {
    let sql = format!("SELECT * FROM {} ORDER BY created_at DESC", kind.table());
    let rows = sqlx::query(&sql).fetch_all(db).await?;
    let mut records: Vec<SessionRecord> = rows.iter().map(|r| map_row(kind, r)).collect();
    attach_faculty(db, &mut records).await?;
    Ok(records)
}

/// Every session from all three tables, merged newest-first
pub async fn fetch_all_merged(db: &SqlitePool) -> Result<Vec<SessionRecord>> {
    let mut merged = Vec::new();
    for kind in [SessionKind::Dicom, SessionKind::Vimeo, SessionKind::Live] {
        let sql = format!("SELECT * FROM {}", kind.table());
        let rows = sqlx::query(&sql).fetch_all(db).await?;
        merged.extend(rows.iter().map(|r| map_row(kind, r)));
    }
    sort_newest_first(&mut merged);
    attach_faculty(db, &mut merged).await?;
    Ok(merged)
}

/// Sort a merged list newest-first (guid tie-break keeps order stable)
pub fn sort_newest_first(sessions: &mut [SessionRecord]) {
    sessions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.guid.cmp(&b.guid))
    });
}

pub async fn fetch_by_id(
    db: &SqlitePool,
    kind: SessionKind,
    guid: &str,
) -> Result<Option<SessionRecord>> {
    let sql = format!("SELECT * FROM {} WHERE guid = ?", kind.table());
    let row = sqlx::query(&sql).bind(guid).fetch_optional(db).await?;
    match row {
        Some(row) => {
            let mut records = vec![map_row(kind, &row)];
            attach_faculty(db, &mut records).await?;
            Ok(records.pop())
        }
        None => Ok(None),
    }
}

/// Look a session id up across all three tables
pub async fn find_by_id_any(db: &SqlitePool, guid: &str) -> Result<Option<SessionRecord>> {
    for kind in [SessionKind::Dicom, SessionKind::Vimeo, SessionKind::Live] {
        if let Some(record) = fetch_by_id(db, kind, guid).await? {
            return Ok(Some(record));
        }
    }
    Ok(None)
}

/// Fetch a set of ids from one table (watch-state hydration)
pub async fn fetch_by_ids(
    db: &SqlitePool,
    kind: SessionKind,
    ids: &[String],
) -> Result<Vec<SessionRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT * FROM {} WHERE guid IN ({})",
        kind.table(),
        placeholders
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(db).await?;
    let mut records: Vec<SessionRecord> = rows.iter().map(|r| map_row(kind, r)).collect();
    attach_faculty(db, &mut records).await?;
    Ok(records)
}

/// Fetch a set of ids from every table (top-watched hydration)
pub async fn fetch_by_ids_any(db: &SqlitePool, ids: &[String]) -> Result<Vec<SessionRecord>> {
    let mut found = Vec::new();
    for kind in [SessionKind::Dicom, SessionKind::Vimeo, SessionKind::Live] {
        found.extend(fetch_by_ids(db, kind, ids).await?);
    }
    Ok(found)
}

/// Live programs starting at or after `now_ms`, soonest first
pub async fn fetch_upcoming_live(
    db: &SqlitePool,
    now_ms: i64,
    limit: i64,
) -> Result<Vec<SessionRecord>> {
    let rows = sqlx::query(
        "SELECT * FROM live_programs WHERE start_date >= ? ORDER BY start_date ASC LIMIT ?",
    )
    .bind(now_ms)
    .bind(limit)
    .fetch_all(db)
    .await?;
    let mut records: Vec<SessionRecord> = rows.iter().map(live_from_row).collect();
    attach_faculty(db, &mut records).await?;
    Ok(records)
}

/// Load faculty cards for a batch of sessions in one query
pub async fn attach_faculty(db: &SqlitePool, sessions: &mut [SessionRecord]) -> Result<()> {
    if sessions.is_empty() {
        return Ok(());
    }
    let ids: Vec<&str> = sessions.iter().map(|s| s.guid.as_str()).collect();
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT sf.session_guid, f.guid, f.name, f.image
         FROM session_faculty sf
         JOIN faculty f ON f.guid = sf.faculty_guid
         WHERE sf.session_guid IN ({})",
        placeholders
    );
    let mut query = sqlx::query(&sql);
    for id in &ids {
        query = query.bind(*id);
    }
    let rows = query.fetch_all(db).await?;

    let mut by_session: std::collections::HashMap<String, Vec<FacultyCard>> =
        std::collections::HashMap::new();
    for row in &rows {
        let session_guid: String = row.get(0);
        by_session.entry(session_guid).or_default().push(FacultyCard {
            guid: row.get(1),
            name: row.get(2),
            image: row.get(3),
        });
    }

    for session in sessions.iter_mut() {
        session.faculty = by_session.remove(&session.guid).unwrap_or_default();
    }
    Ok(())
}

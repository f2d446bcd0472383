//! Database initialization
//!
//! Creates the database file on first run and brings the schema up to date.
//! All statements are idempotent (`CREATE ... IF NOT EXISTS`), so init is
//! safe to run on every start.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_pragmas(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Connect to an in-memory database with the full schema (tests)
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    configure_pragmas(&pool).await?;
    create_schema(&pool).await?;
    Ok(pool)
}

async fn configure_pragmas(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

/// Create every table the service uses
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_users_table(pool).await?;

    // Session catalog: three independent tables exposed as one stream
    create_dicom_cases_table(pool).await?;
    create_recorded_lectures_table(pool).await?;
    create_live_programs_table(pool).await?;
    create_session_faculty_table(pool).await?;

    create_faculty_table(pool).await?;
    create_modules_table(pool).await?;
    create_pathologies_table(pool).await?;
    create_mastery_levels_table(pool).await?;

    create_packages_table(pool).await?;
    create_subscriptions_table(pool).await?;
    create_payment_transactions_table(pool).await?;

    create_assessments_tables(pool).await?;
    create_observations_tables(pool).await?;
    create_playback_progress_table(pool).await?;
    create_session_views_table(pool).await?;
    create_reviews_table(pool).await?;

    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            name TEXT NOT NULL,
            mobile_number TEXT NOT NULL UNIQUE,
            designation TEXT,
            role TEXT NOT NULL DEFAULT 'user',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_dicom_cases_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dicom_cases (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            module_name TEXT,
            pathology_name TEXT,
            pathology_id TEXT,
            difficulty TEXT NOT NULL DEFAULT 'intermediate',
            is_assessment INTEGER NOT NULL DEFAULT 0,
            is_free INTEGER NOT NULL DEFAULT 0,
            sponsored INTEGER NOT NULL DEFAULT 0,
            dicom_study_id TEXT,
            dicom_case_id TEXT,
            dicom_case_video_url TEXT,
            case_access_type TEXT NOT NULL DEFAULT 'free',
            resource_links TEXT,
            image_url_1920x1080 TEXT,
            image_url_522x760 TEXT,
            start_date INTEGER,
            end_date INTEGER,
            start_time TEXT,
            end_time TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_recorded_lectures_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recorded_lectures (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            module_name TEXT NOT NULL,
            pathology_name TEXT,
            module_id TEXT,
            pathology_id TEXT,
            difficulty TEXT NOT NULL DEFAULT 'beginner',
            is_assessment INTEGER NOT NULL DEFAULT 0,
            is_free INTEGER NOT NULL DEFAULT 0,
            sponsored INTEGER NOT NULL DEFAULT 0,
            session_duration TEXT,
            vimeo_video_id TEXT,
            video_url TEXT,
            video_type TEXT,
            resource_links TEXT,
            image_url_1920x1080 TEXT,
            image_url_522x760 TEXT,
            start_date INTEGER,
            end_date INTEGER,
            start_time TEXT,
            end_time TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_live_programs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS live_programs (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            module_name TEXT NOT NULL,
            pathology_name TEXT,
            pathology_id TEXT,
            difficulty TEXT NOT NULL DEFAULT 'beginner',
            is_free INTEGER NOT NULL DEFAULT 0,
            sponsored INTEGER NOT NULL DEFAULT 0,
            live_kind TEXT NOT NULL DEFAULT 'Zoom',
            zoom_meeting_id TEXT,
            zoom_password TEXT,
            zoom_join_url TEXT,
            zoom_backup_link TEXT,
            vimeo_video_id TEXT,
            vimeo_live_url TEXT,
            resource_links TEXT,
            image_url_1920x1080 TEXT,
            image_url_522x760 TEXT,
            start_date INTEGER NOT NULL,
            end_date INTEGER NOT NULL,
            start_time TEXT,
            end_time TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_session_faculty_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_faculty (
            session_guid TEXT NOT NULL,
            faculty_guid TEXT NOT NULL,
            PRIMARY KEY (session_guid, faculty_guid)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_faculty_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS faculty (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            title TEXT,
            location TEXT,
            country TEXT,
            email TEXT NOT NULL UNIQUE,
            phone TEXT,
            description TEXT,
            image TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_modules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS modules (
            guid TEXT PRIMARY KEY,
            module_name TEXT NOT NULL UNIQUE,
            description TEXT,
            image_url TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_pathologies_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pathologies (
            guid TEXT PRIMARY KEY,
            pathology_name TEXT NOT NULL,
            description TEXT,
            module_id TEXT,
            image_url TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_mastery_levels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mastery_levels (
            guid TEXT PRIMARY KEY,
            level_name TEXT NOT NULL UNIQUE,
            description TEXT,
            points INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_packages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS packages (
            guid TEXT PRIMARY KEY,
            package_name TEXT NOT NULL,
            amount INTEGER NOT NULL,
            duration_days INTEGER NOT NULL DEFAULT 0,
            duration_unit TEXT NOT NULL DEFAULT 'monthly',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_subscriptions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            guid TEXT PRIMARY KEY,
            subscriber_name TEXT NOT NULL,
            subscriber_id TEXT NOT NULL,
            package_name TEXT NOT NULL,
            package_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            subscription_date INTEGER NOT NULL,
            expiry_date INTEGER NOT NULL,
            payment_id TEXT,
            transaction_id TEXT,
            payment_gateway TEXT NOT NULL DEFAULT 'razorpay'
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_payment_transactions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payment_transactions (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            package_id TEXT NOT NULL,
            package_name TEXT NOT NULL,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL DEFAULT 'INR',
            payment_gateway TEXT NOT NULL,
            gateway_order_id TEXT NOT NULL UNIQUE,
            gateway_payment_id TEXT,
            status TEXT NOT NULL DEFAULT 'created',
            gateway_response TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_assessments_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessments (
            guid TEXT PRIMARY KEY,
            module_id TEXT NOT NULL,
            difficulty TEXT NOT NULL DEFAULT 'beginner',
            question TEXT NOT NULL,
            description TEXT,
            option_a TEXT NOT NULL,
            option_b TEXT NOT NULL,
            option_c TEXT NOT NULL,
            option_d TEXT NOT NULL,
            correct_answer TEXT NOT NULL,
            image TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessment_progress (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            module_id TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            total_questions INTEGER NOT NULL DEFAULT 0,
            correct_answers INTEGER NOT NULL DEFAULT 0,
            points INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            UNIQUE (user_id, module_id, difficulty)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessment_attempts (
            guid TEXT PRIMARY KEY,
            progress_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            selected_answer TEXT NOT NULL,
            is_correct INTEGER NOT NULL,
            answered_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_observations_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS observations (
            guid TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            session_name TEXT,
            module_name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS observation_items (
            guid TEXT PRIMARY KEY,
            observation_id TEXT NOT NULL,
            observation_text TEXT NOT NULL,
            faculty_observation TEXT,
            correct_answer TEXT,
            points INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS observation_scores (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            total_correct INTEGER NOT NULL DEFAULT 0,
            total_attempts INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 0,
            started_at INTEGER NOT NULL,
            completed_at INTEGER,
            UNIQUE (user_id, session_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_playback_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playback_progress (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            session_kind TEXT NOT NULL,
            current_time_secs REAL NOT NULL DEFAULT 0,
            last_watched_at INTEGER NOT NULL,
            UNIQUE (user_id, session_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_playback_progress_user
         ON playback_progress (user_id, last_watched_at DESC)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_session_views_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_views (
            guid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            view_count INTEGER NOT NULL DEFAULT 1,
            is_completed INTEGER NOT NULL DEFAULT 0,
            last_viewed_at INTEGER NOT NULL,
            UNIQUE (user_id, session_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_reviews_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reviews (
            guid TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            rating INTEGER NOT NULL,
            comment TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (item_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

//! Tiered content access control
//!
//! Every catalog listing runs through [`apply_access_control`], which
//! decides per session whether the caller gets the full record or a
//! sanitized preview:
//!
//! - **Subscribed** users see everything unlocked.
//! - **Guests** get a random sample of the free sessions unlocked (so
//!   repeat anonymous visits rotate the teaser content) and the rest
//!   locked behind a login prompt.
//! - **Logged-in** users get a deterministic allowance of free sessions
//!   (the guest limit plus a fixed bonus) and the rest locked behind a
//!   subscribe prompt.
//!
//! Unlocked sessions always precede locked ones in the response.

use rand::seq::SliceRandom;
use serde::Serialize;
use sqlx::SqlitePool;

use casehub_common::Result;

use crate::db::sessions::{FacultyCard, SessionKind, SessionRecord};

/// Extra free sessions granted for logging in, on top of the guest limit
pub const LOGIN_BONUS: usize = 3;

/// Preview description length for locked sessions
const PREVIEW_LEN: usize = 100;

pub const LOCK_REASON_GUEST: &str = "Please login to access more content";
pub const LOCK_REASON_LOGGED_IN: &str = "Subscribe to access this content";

/// The caller's access tier, resolved once per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Guest,
    #[serde(rename = "logged_in")]
    LoggedIn,
    Subscribed,
}

/// Who is asking, attached to the request by the auth middleware
#[derive(Debug, Clone)]
pub struct UserAccess {
    pub user_id: Option<String>,
    pub is_logged_in: bool,
    pub is_subscribed: bool,
}

impl UserAccess {
    pub fn guest() -> UserAccess {
        UserAccess {
            user_id: None,
            is_logged_in: false,
            is_subscribed: false,
        }
    }

    pub fn level(&self) -> AccessLevel {
        if self.is_subscribed {
            AccessLevel::Subscribed
        } else if self.is_logged_in {
            AccessLevel::LoggedIn
        } else {
            AccessLevel::Guest
        }
    }
}

/// Resolve the caller's tier from the database. Subscription status is
/// computed at read time from unexpired active rows, so a lapsed
/// subscription downgrades on the next request without any sweep job.
pub async fn resolve_access(db: &SqlitePool, user_id: Option<&str>) -> Result<UserAccess> {
    let Some(user_id) = user_id else {
        return Ok(UserAccess::guest());
    };
    let now = casehub_common::time::now_ms();
    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM subscriptions
         WHERE subscriber_id = ? AND status = 'active' AND expiry_date > ?",
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(db)
    .await?;
    Ok(UserAccess {
        user_id: Some(user_id.to_string()),
        is_logged_in: true,
        is_subscribed: active > 0,
    })
}

/// Catalog-safe preview of a locked session. Video URLs, DICOM
/// identifiers, and meeting credentials never leave the server.
#[derive(Debug, Clone, Serialize)]
pub struct LockedPreview {
    pub guid: String,
    pub session_type: SessionKind,
    pub title: String,
    pub description: Option<String>,
    pub module_name: Option<String>,
    pub pathology_name: Option<String>,
    pub difficulty: String,
    pub is_free: bool,
    pub sponsored: bool,
    pub image_url_1920x1080: Option<String>,
    pub image_url_522x760: Option<String>,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub created_at: i64,
    pub faculty: Vec<FacultyCard>,
}

/// One catalog entry after access control
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GatedSession {
    Unlocked {
        #[serde(flatten)]
        session: SessionRecord,
        is_locked: bool,
        access_level: AccessLevel,
    },
    Locked {
        #[serde(flatten)]
        session: LockedPreview,
        is_locked: bool,
        access_level: AccessLevel,
        lock_reason: &'static str,
    },
}

impl GatedSession {
    pub fn is_locked(&self) -> bool {
        match self {
            GatedSession::Unlocked { is_locked, .. } => *is_locked,
            GatedSession::Locked { is_locked, .. } => *is_locked,
        }
    }

    pub fn guid(&self) -> &str {
        match self {
            GatedSession::Unlocked { session, .. } => &session.guid,
            GatedSession::Locked { session, .. } => &session.guid,
        }
    }
}

fn unlocked(session: SessionRecord, level: AccessLevel) -> GatedSession {
    GatedSession::Unlocked {
        session,
        is_locked: false,
        access_level: level,
    }
}

fn locked(session: SessionRecord, level: AccessLevel, reason: &'static str) -> GatedSession {
    GatedSession::Locked {
        session: sanitize(session),
        is_locked: true,
        access_level: level,
        lock_reason: reason,
    }
}

/// Strip restricted fields and truncate the description to a preview
fn sanitize(session: SessionRecord) -> LockedPreview {
    let description = session.description.map(|d| {
        if d.chars().count() > PREVIEW_LEN {
            let preview: String = d.chars().take(PREVIEW_LEN).collect();
            format!("{}...", preview)
        } else {
            d
        }
    });
    LockedPreview {
        guid: session.guid,
        session_type: session.session_type,
        title: session.title,
        description,
        module_name: session.module_name,
        pathology_name: session.pathology_name,
        difficulty: session.difficulty,
        is_free: session.is_free,
        sponsored: session.sponsored,
        image_url_1920x1080: session.image_url_1920x1080,
        image_url_522x760: session.image_url_522x760,
        start_date: session.start_date,
        end_date: session.end_date,
        start_time: session.start_time,
        end_time: session.end_time,
        created_at: session.created_at,
        faculty: session.faculty,
    }
}

/// Gate a listing for the caller's tier.
///
/// `free_limit` is the configured guest allowance. The returned list keeps
/// unlocked sessions first, then locked ones, each group preserving the
/// input order (random order for the guest sample).
pub fn apply_access_control(
    sessions: Vec<SessionRecord>,
    access: &UserAccess,
    free_limit: usize,
) -> Vec<GatedSession> {
    let level = access.level();
    match level {
        AccessLevel::Subscribed => sessions
            .into_iter()
            .map(|s| unlocked(s, level))
            .collect(),
        AccessLevel::Guest => gate_free_allowance(
            sessions,
            level,
            free_limit,
            LOCK_REASON_GUEST,
            true,
        ),
        AccessLevel::LoggedIn => gate_free_allowance(
            sessions,
            level,
            free_limit + LOGIN_BONUS,
            LOCK_REASON_LOGGED_IN,
            false,
        ),
    }
}

/// Unlock up to `allowance` free sessions, locking everything else.
/// When `shuffle` is set the free pool is sampled randomly; otherwise
/// the first `allowance` free sessions in input order are taken.
fn gate_free_allowance(
    sessions: Vec<SessionRecord>,
    level: AccessLevel,
    allowance: usize,
    reason: &'static str,
    shuffle: bool,
) -> Vec<GatedSession> {
    let (free, paid): (Vec<SessionRecord>, Vec<SessionRecord>) =
        sessions.into_iter().partition(|s| s.is_free);

    // Only the unlocked sample is randomized; the locked remainder keeps
    // the input order, so indices are shuffled rather than the sessions.
    let mut picks: Vec<usize> = (0..free.len()).collect();
    if shuffle {
        picks.shuffle(&mut rand::thread_rng());
    }
    picks.truncate(allowance);

    let mut free: Vec<Option<SessionRecord>> = free.into_iter().map(Some).collect();
    let mut output = Vec::with_capacity(free.len() + paid.len());
    for &index in &picks {
        if let Some(session) = free[index].take() {
            output.push(unlocked(session, level));
        }
    }
    for session in free.into_iter().flatten() {
        output.push(locked(session, level, reason));
    }
    for session in paid {
        output.push(locked(session, level, reason));
    }
    output
}

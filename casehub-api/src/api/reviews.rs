//! Session reviews: one per user per item, owner-only edits

use axum::extract::{Extension, Path, Query, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use casehub_common::time::now_ms;

use crate::api::middleware::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::{protected, AppState};

/// Newest reviews returned for an item
const REVIEW_WINDOW: i64 = 4;
const MAX_COMMENT_LEN: usize = 500;

pub fn routes(state: AppState) -> Router<AppState> {
    let open = Router::new()
        .route("/get", get(get_reviews))
        .route("/getUserReview", get(get_user_review));
    let authed = protected(
        Router::new()
            .route("/create", post(create_review))
            .route("/update/:review_id", put(update_review))
            .route("/delete/:review_id", delete(delete_review)),
        &state,
    );
    open.merge(authed)
}

#[derive(Debug, Deserialize)]
struct ItemParam {
    item_id: String,
}

/// GET /get?item_id=: the newest reviews with reviewer names
async fn get_reviews(
    State(state): State<AppState>,
    Query(params): Query<ItemParam>,
) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query(
        "SELECT r.guid, r.rating, r.comment, r.created_at, u.name
         FROM reviews r
         JOIN users u ON u.guid = r.user_id
         WHERE r.item_id = ?
         ORDER BY r.created_at DESC
         LIMIT ?",
    )
    .bind(&params.item_id)
    .bind(REVIEW_WINDOW)
    .fetch_all(&state.db)
    .await?;

    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "guid": r.get::<String, _>("guid"),
                "rating": r.get::<i64, _>("rating"),
                "comment": r.get::<Option<String>, _>("comment"),
                "created_at": r.get::<i64, _>("created_at"),
                "reviewer_name": r.get::<String, _>("name"),
            })
        })
        .collect();
    Ok(Json(json!({ "data": data })))
}

#[derive(Debug, Deserialize)]
struct UserReviewParams {
    item_id: String,
    user_id: String,
}

async fn get_user_review(
    State(state): State<AppState>,
    Query(params): Query<UserReviewParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let row = sqlx::query(
        "SELECT guid, rating, comment, created_at, updated_at
         FROM reviews WHERE item_id = ? AND user_id = ?",
    )
    .bind(&params.item_id)
    .bind(&params.user_id)
    .fetch_optional(&state.db)
    .await?;
    match row {
        Some(r) => Ok(Json(json!({ "data": {
            "guid": r.get::<String, _>("guid"),
            "rating": r.get::<i64, _>("rating"),
            "comment": r.get::<Option<String>, _>("comment"),
            "created_at": r.get::<i64, _>("created_at"),
            "updated_at": r.get::<i64, _>("updated_at"),
        }}))),
        None => Ok(Json(json!({ "data": null }))),
    }
}

#[derive(Debug, Deserialize)]
struct ReviewBody {
    #[serde(default)]
    item_id: Option<String>,
    rating: i64,
    #[serde(default)]
    comment: Option<String>,
}

fn validate_review(rating: i64, comment: &Option<String>) -> ApiResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(ApiError::invalid("rating must be between 1 and 5"));
    }
    if let Some(comment) = comment {
        if comment.chars().count() > MAX_COMMENT_LEN {
            return Err(ApiError::invalid("comment must be at most 500 characters"));
        }
    }
    Ok(())
}

async fn create_review(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<ReviewBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let Some(item_id) = &body.item_id else {
        return Err(ApiError::invalid("item_id is required"));
    };
    validate_review(body.rating, &body.comment)?;

    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE item_id = ? AND user_id = ?")
            .bind(item_id)
            .bind(&user.user_id)
            .fetch_one(&state.db)
            .await?;
    if existing > 0 {
        return Err(ApiError::invalid("You have already reviewed this item"));
    }

    let guid = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        "INSERT INTO reviews (guid, item_id, user_id, rating, comment, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&guid)
    .bind(item_id)
    .bind(&user.user_id)
    .bind(body.rating)
    .bind(&body.comment)
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await?;

    Ok(Json(json!({
        "message": "Review created successfully",
        "review_id": guid,
    })))
}

/// Owner check shared by update and delete
async fn review_owner(state: &AppState, review_id: &str) -> ApiResult<String> {
    let owner: Option<String> = sqlx::query_scalar("SELECT user_id FROM reviews WHERE guid = ?")
        .bind(review_id)
        .fetch_optional(&state.db)
        .await?;
    owner.ok_or_else(|| ApiError::not_found("Review not found"))
}

async fn update_review(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(review_id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> ApiResult<Json<serde_json::Value>> {
    validate_review(body.rating, &body.comment)?;
    if review_owner(&state, &review_id).await? != user.user_id {
        return Err(ApiError::forbidden("You can only edit your own review"));
    }
    sqlx::query("UPDATE reviews SET rating = ?, comment = ?, updated_at = ? WHERE guid = ?")
        .bind(body.rating)
        .bind(&body.comment)
        .bind(now_ms())
        .bind(&review_id)
        .execute(&state.db)
        .await?;
    Ok(Json(json!({ "message": "Review updated successfully" })))
}

async fn delete_review(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(review_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if review_owner(&state, &review_id).await? != user.user_id {
        return Err(ApiError::forbidden("You can only delete your own review"));
    }
    sqlx::query("DELETE FROM reviews WHERE guid = ?")
        .bind(&review_id)
        .execute(&state.db)
        .await?;
    Ok(Json(json!({ "message": "Review deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(validate_review(1, &None).is_ok());
        assert!(validate_review(5, &None).is_ok());
        assert!(validate_review(0, &None).is_err());
        assert!(validate_review(6, &None).is_err());
    }

    #[test]
    fn test_comment_length() {
        assert!(validate_review(3, &Some("x".repeat(500))).is_ok());
        assert!(validate_review(3, &Some("x".repeat(501))).is_err());
    }
}

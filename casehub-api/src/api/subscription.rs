//! Subscription packages and payment flows
//!
//! Two gateways share one transaction table keyed by the gateway's order
//! id. Checkout verification, webhook delivery, and PayPal capture all
//! funnel into the same subscription-activation path, so a replayed
//! notification can never double-subscribe a user.

use axum::body::Bytes;
use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use casehub_common::db::models::{Package, Subscription};
use casehub_common::time::{days_from_now_ms, ms_to_rfc3339, now_ms};
use casehub_common::{Error, Result};

use crate::api::middleware::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::payments::razorpay::{verify_checkout_signature, verify_webhook_signature};
use crate::{protected, AppState};

pub fn routes(state: AppState) -> Router<AppState> {
    let open = Router::new()
        .route("/get", get(list_packages))
        .route("/getPackageById", get(get_package))
        .route("/webhook", post(razorpay_webhook))
        .route("/paypal-verify", get(paypal_verify));
    let authed = protected(
        Router::new()
            .route("/createPackage", post(create_package))
            .route("/getUserSubscription", get(get_user_subscription))
            .route("/initiatePayment", post(initiate_payment))
            .route("/verify-payment", post(verify_payment))
            .route("/paypal-order", post(paypal_order)),
        &state,
    );
    open.merge(authed)
}

// ========================================
// Packages
// ========================================

fn duration_days(unit: &str) -> Option<i64> {
    match unit {
        "monthly" => Some(30),
        "biannually" => Some(180),
        "yearly" => Some(365),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct CreatePackageBody {
    package_name: String,
    amount: i64,
    duration_unit: String,
}

async fn create_package(
    State(state): State<AppState>,
    Json(body): Json<CreatePackageBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.package_name.trim().is_empty() {
        return Err(ApiError::invalid("package_name is required"));
    }
    if body.amount <= 0 {
        return Err(ApiError::invalid("amount must be positive"));
    }
    let Some(days) = duration_days(&body.duration_unit) else {
        return Err(ApiError::invalid(
            "duration_unit must be monthly, biannually, or yearly",
        ));
    };

    let guid = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO packages (guid, package_name, amount, duration_days, duration_unit, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&guid)
    .bind(body.package_name.trim())
    .bind(body.amount)
    .bind(days)
    .bind(&body.duration_unit)
    .bind(now_ms())
    .execute(&state.db)
    .await?;

    Ok(Json(json!({
        "message": "Package created successfully",
        "package_id": guid,
    })))
}

async fn list_packages(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let rows = sqlx::query("SELECT * FROM packages ORDER BY amount ASC")
        .fetch_all(&state.db)
        .await?;
    let data: Vec<Package> = rows
        .iter()
        .map(|r| Package {
            guid: r.get("guid"),
            package_name: r.get("package_name"),
            amount: r.get("amount"),
            duration_days: r.get("duration_days"),
            duration_unit: r.get("duration_unit"),
            created_at: r.get("created_at"),
        })
        .collect();
    Ok(Json(json!({ "data": data })))
}

#[derive(Debug, Deserialize)]
struct PackageIdParam {
    id: String,
}

async fn get_package(
    State(state): State<AppState>,
    Query(params): Query<PackageIdParam>,
) -> ApiResult<Json<serde_json::Value>> {
    let package = fetch_package(&state.db, &params.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Package not found"))?;
    Ok(Json(json!({ "data": package })))
}

async fn fetch_package(db: &SqlitePool, guid: &str) -> Result<Option<Package>> {
    let row = sqlx::query("SELECT * FROM packages WHERE guid = ?")
        .bind(guid)
        .fetch_optional(db)
        .await?;
    Ok(row.map(|r| Package {
        guid: r.get("guid"),
        package_name: r.get("package_name"),
        amount: r.get("amount"),
        duration_days: r.get("duration_days"),
        duration_unit: r.get("duration_unit"),
        created_at: r.get("created_at"),
    }))
}

/// GET /getUserSubscription: the caller's newest subscription row
async fn get_user_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<serde_json::Value>> {
    let row = sqlx::query(
        "SELECT * FROM subscriptions WHERE subscriber_id = ?
         ORDER BY subscription_date DESC LIMIT 1",
    )
    .bind(&user.user_id)
    .fetch_optional(&state.db)
    .await?;

    match row {
        Some(r) => {
            let subscription = Subscription {
                guid: r.get("guid"),
                subscriber_name: r.get("subscriber_name"),
                subscriber_id: r.get("subscriber_id"),
                package_name: r.get("package_name"),
                package_id: r.get("package_id"),
                status: r.get("status"),
                subscription_date: r.get("subscription_date"),
                expiry_date: r.get("expiry_date"),
                payment_id: r.get("payment_id"),
                transaction_id: r.get("transaction_id"),
                payment_gateway: r.get("payment_gateway"),
            };
            let active = subscription.status == "active" && subscription.expiry_date > now_ms();
            Ok(Json(json!({
                "data": subscription,
                "is_active": active,
                "expires": ms_to_rfc3339(subscription.expiry_date),
            })))
        }
        None => Ok(Json(json!({ "data": null, "is_active": false }))),
    }
}

// ========================================
// Subscription activation (shared by all gateways)
// ========================================

/// Mark a transaction captured and create the subscription it paid for.
/// Safe to call twice for the same order: a transaction already captured
/// is left alone.
async fn activate_subscription(
    db: &SqlitePool,
    gateway_order_id: &str,
    gateway_payment_id: Option<&str>,
    gateway_response: Option<&str>,
) -> Result<()> {
    let row = sqlx::query(
        "SELECT guid, user_id, package_id, package_name, payment_gateway
         FROM payment_transactions WHERE gateway_order_id = ?",
    )
    .bind(gateway_order_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::NotFound(format!("no transaction for order {}", gateway_order_id)))?;

    // The status transition is the gate: only the delivery that flips the
    // row to 'captured' goes on to create the subscription, so concurrent
    // deliveries of the same order cannot both insert one.
    let claimed = sqlx::query(
        "UPDATE payment_transactions
         SET status = 'captured', gateway_payment_id = ?, gateway_response = ?
         WHERE gateway_order_id = ? AND status <> 'captured'",
    )
    .bind(gateway_payment_id)
    .bind(gateway_response)
    .bind(gateway_order_id)
    .execute(db)
    .await?;
    if claimed.rows_affected() == 0 {
        tracing::info!("Order {} already captured, skipping", gateway_order_id);
        return Ok(());
    }

    let transaction_guid: String = row.get("guid");
    let user_id: String = row.get("user_id");
    let package_id: String = row.get("package_id");
    let package_name: String = row.get("package_name");
    let gateway: String = row.get("payment_gateway");

    let package = fetch_package(db, &package_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("package {} missing", package_id)))?;
    let subscriber_name: String = sqlx::query_scalar("SELECT name FROM users WHERE guid = ?")
        .bind(&user_id)
        .fetch_optional(db)
        .await?
        .unwrap_or_default();

    sqlx::query(
        "INSERT INTO subscriptions
             (guid, subscriber_name, subscriber_id, package_name, package_id,
              status, subscription_date, expiry_date, payment_id, transaction_id, payment_gateway)
         VALUES (?, ?, ?, ?, ?, 'active', ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&subscriber_name)
    .bind(&user_id)
    .bind(&package_name)
    .bind(&package_id)
    .bind(now_ms())
    .bind(days_from_now_ms(package.duration_days))
    .bind(gateway_payment_id)
    .bind(&transaction_guid)
    .bind(&gateway)
    .execute(db)
    .await?;

    tracing::info!(
        "Subscription activated for user {} (package {})",
        user_id,
        package_name
    );
    Ok(())
}

async fn record_failed_transaction(
    db: &SqlitePool,
    gateway_order_id: &str,
    status: &str,
    detail: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE payment_transactions SET status = ?, gateway_response = ?
         WHERE gateway_order_id = ?",
    )
    .bind(status)
    .bind(detail)
    .bind(gateway_order_id)
    .execute(db)
    .await?;
    Ok(())
}

// ========================================
// Razorpay
// ========================================

#[derive(Debug, Deserialize)]
struct InitiateBody {
    package_id: String,
}

/// POST /initiatePayment: create a Razorpay order for a package
async fn initiate_payment(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<InitiateBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let package = fetch_package(&state.db, &body.package_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Package not found"))?;

    let receipt = Uuid::new_v4().to_string();
    // Razorpay amounts are in paise
    let amount_paise = package.amount * 100;
    let order = state
        .razorpay
        .create_order(amount_paise, "INR", &receipt)
        .await?;

    sqlx::query(
        "INSERT INTO payment_transactions
             (guid, user_id, package_id, package_name, amount, currency,
              payment_gateway, gateway_order_id, status, created_at)
         VALUES (?, ?, ?, ?, ?, 'INR', 'razorpay', ?, 'created', ?)",
    )
    .bind(&receipt)
    .bind(&user.user_id)
    .bind(&package.guid)
    .bind(&package.package_name)
    .bind(amount_paise)
    .bind(&order.id)
    .bind(now_ms())
    .execute(&state.db)
    .await?;

    Ok(Json(json!({
        "order_id": order.id,
        "amount": order.amount,
        "currency": order.currency,
        "key_id": state.config.razorpay.key_id,
    })))
}

#[derive(Debug, Deserialize)]
struct VerifyBody {
    razorpay_order_id: String,
    razorpay_payment_id: String,
    razorpay_signature: String,
}

/// POST /verify-payment: checkout callback signature check + capture
async fn verify_payment(
    State(state): State<AppState>,
    Json(body): Json<VerifyBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let valid = verify_checkout_signature(
        &state.config.razorpay.key_secret,
        &body.razorpay_order_id,
        &body.razorpay_payment_id,
        &body.razorpay_signature,
    );
    if !valid {
        record_failed_transaction(
            &state.db,
            &body.razorpay_order_id,
            "signature_mismatch",
            None,
        )
        .await?;
        return Err(ApiError::invalid("Payment signature verification failed"));
    }

    let payment = state.razorpay.fetch_payment(&body.razorpay_payment_id).await?;
    if payment.status != "captured" {
        record_failed_transaction(
            &state.db,
            &body.razorpay_order_id,
            &payment.status,
            None,
        )
        .await?;
        return Err(ApiError::invalid(format!(
            "Payment not captured (status: {})",
            payment.status
        )));
    }

    activate_subscription(
        &state.db,
        &body.razorpay_order_id,
        Some(&body.razorpay_payment_id),
        None,
    )
    .await?;
    Ok(Json(json!({ "message": "Payment verified, subscription active" })))
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: WebhookPaymentWrapper,
}

#[derive(Debug, Deserialize)]
struct WebhookPaymentWrapper {
    entity: WebhookPaymentEntity,
}

#[derive(Debug, Deserialize)]
struct WebhookPaymentEntity {
    id: String,
    order_id: String,
    status: String,
}

/// POST /webhook: Razorpay server-to-server notification. Signature is
/// an HMAC of the raw body, so the body is read as bytes before parsing.
async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let signature = headers
        .get("X-Razorpay-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::invalid("Missing X-Razorpay-Signature header"))?;

    if !verify_webhook_signature(&state.config.razorpay.webhook_secret, &body, signature) {
        tracing::warn!("Webhook signature verification failed");
        return Err(ApiError::invalid("Invalid webhook signature"));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::invalid(format!("Malformed webhook body: {}", e)))?;

    if event.event == "payment.captured" || event.payload.payment.entity.status == "captured" {
        activate_subscription(
            &state.db,
            &event.payload.payment.entity.order_id,
            Some(&event.payload.payment.entity.id),
            Some(&event.event),
        )
        .await?;
    } else {
        record_failed_transaction(
            &state.db,
            &event.payload.payment.entity.order_id,
            &event.payload.payment.entity.status,
            Some(&event.event),
        )
        .await?;
    }

    Ok(Json(json!({ "status": "ok" })))
}

// ========================================
// PayPal
// ========================================

#[derive(Debug, Deserialize)]
struct PaypalOrderBody {
    package_id: String,
    amount: f64,
    currency: String,
    package_name: String,
}

/// POST /paypal-order: create a CAPTURE order and hand back the
/// approval URL for the browser redirect
async fn paypal_order(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<PaypalOrderBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if body.amount <= 0.0 {
        return Err(ApiError::invalid("amount must be positive"));
    }
    if body.currency.trim().is_empty() || body.package_name.trim().is_empty() {
        return Err(ApiError::invalid("currency and package_name are required"));
    }
    let package = fetch_package(&state.db, &body.package_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Package not found"))?;

    let reference = Uuid::new_v4().to_string();
    let base = &state.config.server.frontend_url;
    let return_url = format!("{}/api/subscription/paypal-verify", public_base(&state));
    let cancel_url = format!("{}/payment-failure", base);
    let amount = format!("{:.2}", body.amount);

    let order = state
        .paypal
        .create_order(&amount, &body.currency, &reference, &return_url, &cancel_url)
        .await?;
    let approval = order
        .approve_link()
        .ok_or_else(|| ApiError::payment("PayPal order missing approval link"))?
        .to_string();

    sqlx::query(
        "INSERT INTO payment_transactions
             (guid, user_id, package_id, package_name, amount, currency,
              payment_gateway, gateway_order_id, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 'paypal', ?, 'created', ?)",
    )
    .bind(&reference)
    .bind(&user.user_id)
    .bind(&package.guid)
    .bind(&body.package_name)
    .bind(minor_units(body.amount))
    .bind(body.currency.trim())
    .bind(&order.id)
    .bind(now_ms())
    .execute(&state.db)
    .await?;

    Ok(Json(json!({
        "order_id": order.id,
        "approval_url": approval,
    })))
}

/// Transaction amounts are stored in minor units (paise, cents) so the
/// persisted record matches what the gateway captured.
fn minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn public_base(state: &AppState) -> String {
    format!(
        "http://{}:{}",
        state.config.server.host, state.config.server.port
    )
}

#[derive(Debug, Deserialize)]
struct PaypalVerifyParams {
    /// PayPal order id, passed back on the return redirect
    token: String,
}

/// GET /paypal-verify: buyer lands here after approving; capture and
/// bounce to the frontend
async fn paypal_verify(
    State(state): State<AppState>,
    Query(params): Query<PaypalVerifyParams>,
) -> ApiResult<Redirect> {
    let frontend = &state.config.server.frontend_url;

    let capture = match state.paypal.capture_order(&params.token).await {
        Ok(capture) => capture,
        Err(e) => {
            tracing::error!("PayPal capture failed for {}: {}", params.token, e);
            record_failed_transaction(&state.db, &params.token, "capture_failed", None).await?;
            return Ok(Redirect::to(&format!("{}/payment-failure", frontend)));
        }
    };

    if capture.status == "COMPLETED" {
        activate_subscription(&state.db, &params.token, Some(&capture.id), None).await?;
        Ok(Redirect::to(&format!("{}/payment-success", frontend)))
    } else {
        record_failed_transaction(&state.db, &params.token, &capture.status, None).await?;
        Ok(Redirect::to(&format!("{}/payment-failure", frontend)))
    }
}

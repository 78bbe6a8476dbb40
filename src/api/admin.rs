// src/api/admin.rs
//
// Role-gated moderation and money-movement surface. Every handler re-reads
// the caller's role from the users table before acting (the JWT only proves
// identity).

use actix_web::{get, post, put, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::auth::{require_admin, Gate};
use crate::api::{mailer, stripe_client};
use crate::{db, AppState};

#[get("/therapists/pending")]
pub async fn list_pending_therapists(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
) -> impl Responder {
    if let Gate::Forbidden(resp) = require_admin(&state.pool, *user_id).await {
        return resp;
    }

    match db::list_unverified_therapists(&state.pool).await {
        Ok(profiles) => HttpResponse::Ok().json(profiles),
        Err(e) => {
            log::error!("list_pending_therapists db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRequest {
    /// Defaults to true; false revokes a previously granted verification.
    pub verified: Option<bool>,
}

#[post("/therapists/{id}/verify")]
pub async fn verify_therapist(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<VerifyRequest>,
) -> impl Responder {
    if let Gate::Forbidden(resp) = require_admin(&state.pool, *user_id).await {
        return resp;
    }

    let therapist_id = path.into_inner();
    let verified = payload.verified.unwrap_or(true);

    let result = sqlx::query(
        r#"UPDATE therapist_profiles
           SET is_verified = $1,
               verified_at = CASE WHEN $1 THEN NOW() ELSE NULL END,
               updated_at = NOW()
           WHERE user_id = $2"#,
    )
    .bind(verified)
    .bind(therapist_id)
    .execute(&state.pool)
    .await;

    match result {
        Ok(r) if r.rows_affected() == 1 => {
            log::info!("therapist={therapist_id} verification set to {verified} by admin={}", *user_id);
            HttpResponse::Ok().json(json!({"ok": true, "is_verified": verified}))
        }
        Ok(_) => HttpResponse::NotFound().json(json!({"error": "therapist profile not found"})),
        Err(e) => {
            log::error!("verify_therapist db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FeatureRequest {
    pub featured: bool,
}

#[post("/therapists/{id}/feature")]
pub async fn feature_therapist(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<FeatureRequest>,
) -> impl Responder {
    if let Gate::Forbidden(resp) = require_admin(&state.pool, *user_id).await {
        return resp;
    }

    let result = sqlx::query(
        "UPDATE therapist_profiles SET is_featured = $1, updated_at = NOW() WHERE user_id = $2",
    )
    .bind(payload.featured)
    .bind(path.into_inner())
    .execute(&state.pool)
    .await;

    match result {
        Ok(r) if r.rows_affected() == 1 => {
            HttpResponse::Ok().json(json!({"ok": true, "is_featured": payload.featured}))
        }
        Ok(_) => HttpResponse::NotFound().json(json!({"error": "therapist profile not found"})),
        Err(e) => {
            log::error!("feature_therapist db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/reviews/pending")]
pub async fn list_pending_reviews(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
) -> impl Responder {
    if let Gate::Forbidden(resp) = require_admin(&state.pool, *user_id).await {
        return resp;
    }

    match db::list_pending_reviews(&state.pool).await {
        Ok(reviews) => HttpResponse::Ok().json(reviews),
        Err(e) => {
            log::error!("list_pending_reviews db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn moderate_review(
    state: &AppState,
    admin_id: i32,
    review_id: i32,
    status: &str,
    is_public: bool,
) -> HttpResponse {
    if let Gate::Forbidden(resp) = require_admin(&state.pool, admin_id).await {
        return resp;
    }

    let result = sqlx::query("UPDATE reviews SET status = $1, is_public = $2 WHERE id = $3")
        .bind(status)
        .bind(is_public)
        .bind(review_id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(r) if r.rows_affected() == 1 => {
            log::info!("review={review_id} set to {status} by admin={admin_id}");
            HttpResponse::Ok().json(json!({"ok": true, "status": status, "is_public": is_public}))
        }
        Ok(_) => HttpResponse::NotFound().json(json!({"error": "review not found"})),
        Err(e) => {
            log::error!("moderate_review db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[post("/reviews/{id}/approve")]
pub async fn approve_review(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    path: web::Path<i32>,
) -> impl Responder {
    moderate_review(&state, *user_id, path.into_inner(), "approved", true).await
}

#[post("/reviews/{id}/reject")]
pub async fn reject_review(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    path: web::Path<i32>,
) -> impl Responder {
    moderate_review(&state, *user_id, path.into_inner(), "rejected", false).await
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SuspendRequest {
    pub suspended: bool,
}

#[post("/users/{id}/suspend")]
pub async fn suspend_user(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<SuspendRequest>,
) -> impl Responder {
    if let Gate::Forbidden(resp) = require_admin(&state.pool, *user_id).await {
        return resp;
    }

    let target = path.into_inner();
    let status = if payload.suspended { "suspended" } else { "active" };

    let result = sqlx::query(
        "UPDATE users SET status = $1, updated_at = NOW() WHERE id = $2 AND role <> 'admin'",
    )
    .bind(status)
    .bind(target)
    .execute(&state.pool)
    .await;

    match result {
        Ok(r) if r.rows_affected() == 1 => {
            log::info!("user={target} status set to {status} by admin={}", *user_id);
            HttpResponse::Ok().json(json!({"ok": true, "status": status}))
        }
        Ok(_) => HttpResponse::NotFound().json(json!({"error": "user not found"})),
        Err(e) => {
            log::error!("suspend_user db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/payouts")]
pub async fn list_payouts(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
) -> impl Responder {
    if let Gate::Forbidden(resp) = require_admin(&state.pool, *user_id).await {
        return resp;
    }

    match db::list_payouts(&state.pool).await {
        Ok(payouts) => HttpResponse::Ok().json(payouts),
        Err(e) => {
            log::error!("list_payouts db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRefundRequest {
    pub payment_id: i32,
    /// Defaults to the full payment amount.
    pub amount_cents: Option<i64>,
    pub reason: Option<String>,
}

/// Issues a refund through the processor and records it. A processor failure
/// leaves a `failed` refund row behind and surfaces as 500.
#[utoipa::path(
    post,
    path = "/api/admin/refunds",
    tag = "admin",
    request_body = CreateRefundRequest,
    responses(
        (status = 200, description = "Refund completed"),
        (status = 400, description = "Payment not refundable or bad amount"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Payment not found"),
        (status = 500, description = "Processor refused the refund")
    )
)]
#[post("/refunds")]
pub async fn create_refund(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    payload: web::Json<CreateRefundRequest>,
) -> impl Responder {
    if let Gate::Forbidden(resp) = require_admin(&state.pool, *user_id).await {
        return resp;
    }

    let payment = match db::get_payment(&state.pool, payload.payment_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return HttpResponse::NotFound().json(json!({"error": "payment not found"})),
        Err(e) => {
            log::error!("create_refund payment lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if payment.status != "succeeded" {
        return HttpResponse::BadRequest().json(json!({
            "error": format!("cannot refund a {} payment", payment.status)
        }));
    }

    let amount = payload.amount_cents.unwrap_or(payment.amount_cents);
    if amount <= 0 || amount > payment.amount_cents {
        return HttpResponse::BadRequest().json(json!({"error": "invalid refund amount"}));
    }

    let row = match sqlx::query(
        r#"INSERT INTO refunds (payment_id, appointment_id, amount_cents, reason, status)
           VALUES ($1, $2, $3, $4, 'processing')
           RETURNING id"#,
    )
    .bind(payment.id)
    .bind(payment.appointment_id)
    .bind(amount)
    .bind(payload.reason.as_deref())
    .fetch_one(&state.pool)
    .await
    {
        Ok(r) => r,
        Err(e) => {
            log::error!("create_refund insert error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };
    let refund_id: i32 = row.get("id");

    let provider_refund = if std::env::var("MOCK_STRIPE").unwrap_or_default() == "true" {
        Ok(format!("re_mock_{}", Uuid::new_v4().simple()))
    } else {
        stripe_client::create_refund(
            &state.stripe_secret_key,
            &payment.payment_intent_id,
            Some(amount),
        )
        .await
        .map(|r| r.id)
    };

    let provider_refund_id = match provider_refund {
        Ok(id) => id,
        Err(e) => {
            log::error!("stripe refund error refund={refund_id} payment={}: {e}", payment.id);
            let _ = sqlx::query("UPDATE refunds SET status = 'failed' WHERE id = $1")
                .bind(refund_id)
                .execute(&state.pool)
                .await;
            return HttpResponse::InternalServerError().json(json!({
                "error": "refund failed at the processor"
            }));
        }
    };

    if let Err(e) = sqlx::query(
        "UPDATE refunds SET status = 'completed', provider_refund_id = $1 WHERE id = $2",
    )
    .bind(&provider_refund_id)
    .bind(refund_id)
    .execute(&state.pool)
    .await
    {
        log::error!("create_refund finalize error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    let _ = sqlx::query("UPDATE payments SET status = 'refunded' WHERE id = $1")
        .bind(payment.id)
        .execute(&state.pool)
        .await;
    let _ = sqlx::query(
        "UPDATE appointments SET payment_status = 'refunded', updated_at = NOW() WHERE id = $1",
    )
    .bind(payment.appointment_id)
    .execute(&state.pool)
    .await;

    log::info!(
        "refund completed refund={refund_id} payment={} amount={amount} provider={provider_refund_id}",
        payment.id
    );

    // Best-effort refund notice.
    if let Ok(Some(r)) = sqlx::query("SELECT email FROM users WHERE id = $1")
        .bind(payment.client_id)
        .fetch_optional(&state.pool)
        .await
    {
        let email: String = r.get("email");
        mailer::notify(
            &state.mail_api_key,
            &state.mail_from,
            &email,
            "Your refund has been issued",
            &format!("<p>A refund of {amount} cents is on its way back to your card.</p>"),
        )
        .await;
    }

    HttpResponse::Ok().json(json!({
        "refund_id": refund_id,
        "provider_refund_id": provider_refund_id,
        "amount_cents": amount,
        "status": "completed",
    }))
}

#[get("/settings")]
pub async fn get_settings(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
) -> impl Responder {
    if let Gate::Forbidden(resp) = require_admin(&state.pool, *user_id).await {
        return resp;
    }

    match db::get_platform_settings(&state.pool).await {
        Ok(settings) => HttpResponse::Ok().json(settings),
        Err(e) => {
            log::error!("get_settings db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    pub commission_rate: Option<f64>,
    pub payout_delay_days: Option<i32>,
    pub bookings_enabled: Option<bool>,
}

#[put("/settings")]
pub async fn update_settings(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    payload: web::Json<UpdateSettingsRequest>,
) -> impl Responder {
    if let Gate::Forbidden(resp) = require_admin(&state.pool, *user_id).await {
        return resp;
    }

    if let Some(rate) = payload.commission_rate {
        if !(0.0..=1.0).contains(&rate) {
            return HttpResponse::BadRequest().json(json!({
                "error": "commission_rate must be between 0 and 1"
            }));
        }
    }
    if let Some(days) = payload.payout_delay_days {
        if days < 0 {
            return HttpResponse::BadRequest().json(json!({
                "error": "payout_delay_days must be non-negative"
            }));
        }
    }

    let result = sqlx::query(
        r#"UPDATE platform_settings
           SET commission_rate = COALESCE($1, commission_rate),
               payout_delay_days = COALESCE($2, payout_delay_days),
               bookings_enabled = COALESCE($3, bookings_enabled),
               updated_at = NOW()
           WHERE id = 1"#,
    )
    .bind(payload.commission_rate)
    .bind(payload.payout_delay_days)
    .bind(payload.bookings_enabled)
    .execute(&state.pool)
    .await;

    if let Err(e) = result {
        log::error!("update_settings db error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    match db::get_platform_settings(&state.pool).await {
        Ok(settings) => HttpResponse::Ok().json(settings),
        Err(e) => {
            log::error!("update_settings reload error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

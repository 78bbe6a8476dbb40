// src/api/webhooks.rs

use actix_web::{post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use sqlx::Row;
use utoipa::ToSchema;

use crate::api::{mailer, stripe_client};
use crate::{db, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StripeEventData {
    pub object: StripeEventObject,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StripeEventObject {
    /// Payment-intent id for the payment_intent.* events we handle.
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_payment_error: Option<serde_json::Value>,
}

/// Payment-processor webhook. The raw body is verified against the
/// `Stripe-Signature` header before anything is parsed; unknown events and
/// unknown intents are acknowledged with 200 so the processor stops retrying.
#[utoipa::path(
    post,
    path = "/webhook/stripe",
    tag = "webhooks",
    responses(
        (status = 200, description = "Event processed or deliberately ignored"),
        (status = 400, description = "Missing or invalid signature"),
        (status = 500, description = "Server error")
    )
)]
#[post("/webhook/stripe")]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let signature = req
        .headers()
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if !stripe_client::verify_webhook_signature(
        &body,
        signature,
        &state.stripe_webhook_secret,
        Utc::now().timestamp(),
    ) {
        log::warn!("stripe webhook rejected: bad signature");
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "invalid signature"
        }));
    }

    let event: StripeEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("stripe webhook parse error: {e}");
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid payload"
            }));
        }
    };

    match event.event_type.as_str() {
        "payment_intent.succeeded" => handle_payment_succeeded(&state, &event).await,
        "payment_intent.payment_failed" => handle_payment_failed(&state, &event).await,
        other => {
            log::info!("stripe webhook ignored type={other}");
            HttpResponse::Ok().json(serde_json::json!({"ok": true, "ignored": true}))
        }
    }
}

async fn handle_payment_succeeded(state: &AppState, event: &StripeEvent) -> HttpResponse {
    let intent_id = &event.data.object.id;

    let payment = match db::get_payment_by_intent(&state.pool, intent_id).await {
        Ok(Some(p)) => p,
        // unknown intent: ack so the processor does not retry forever
        Ok(None) => {
            log::warn!("stripe webhook unknown intent={intent_id}");
            return HttpResponse::Ok().json(serde_json::json!({"ok": true, "ignored": true}));
        }
        Err(e) => {
            log::error!("stripe webhook payment lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    // Redelivery: once the payment has left pending, there is nothing to do.
    if payment.status != "pending" {
        return HttpResponse::Ok().json(serde_json::json!({"ok": true, "idempotent": true}));
    }

    let paid_at = Utc::now();
    if let Err(e) = sqlx::query(
        "UPDATE payments SET status = 'succeeded', paid_at = $1 WHERE id = $2",
    )
    .bind(paid_at)
    .bind(payment.id)
    .execute(&state.pool)
    .await
    {
        log::error!("stripe webhook payment update error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    // Confirm the appointment; a cancelled one keeps its status but still
    // records that money arrived (the refund path looks at payment_status).
    if let Err(e) = sqlx::query(
        r#"UPDATE appointments
           SET payment_status = 'paid',
               status = CASE WHEN status = 'pending' THEN 'confirmed' ELSE status END,
               updated_at = NOW()
           WHERE id = $1"#,
    )
    .bind(payment.appointment_id)
    .execute(&state.pool)
    .await
    {
        log::error!("stripe webhook appointment update error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    log::info!(
        "payment succeeded payment={} appointment={} intent={intent_id}",
        payment.id,
        payment.appointment_id
    );

    // Best-effort booking confirmation mail.
    if let Ok(Some(row)) = sqlx::query("SELECT email FROM users WHERE id = $1")
        .bind(payment.client_id)
        .fetch_optional(&state.pool)
        .await
    {
        let email: String = row.get("email");
        mailer::notify(
            &state.mail_api_key,
            &state.mail_from,
            &email,
            "Your session is confirmed",
            &format!(
                "<p>Payment received. Appointment #{} is confirmed.</p>",
                payment.appointment_id
            ),
        )
        .await;
    }

    HttpResponse::Ok().json(serde_json::json!({"ok": true}))
}

async fn handle_payment_failed(state: &AppState, event: &StripeEvent) -> HttpResponse {
    let intent_id = &event.data.object.id;

    let payment = match db::get_payment_by_intent(&state.pool, intent_id).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            return HttpResponse::Ok().json(serde_json::json!({"ok": true, "ignored": true}))
        }
        Err(e) => {
            log::error!("stripe webhook payment lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if payment.status != "pending" {
        return HttpResponse::Ok().json(serde_json::json!({"ok": true, "idempotent": true}));
    }

    if let Err(e) = sqlx::query("UPDATE payments SET status = 'failed' WHERE id = $1")
        .bind(payment.id)
        .execute(&state.pool)
        .await
    {
        log::error!("stripe webhook payment fail-update error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    log::warn!(
        "payment failed payment={} appointment={} intent={intent_id} error={:?}",
        payment.id,
        payment.appointment_id,
        event.data.object.last_payment_error
    );

    HttpResponse::Ok().json(serde_json::json!({"ok": true}))
}

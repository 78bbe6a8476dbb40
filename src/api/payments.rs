// src/api/payments.rs

use actix_web::{post, web, HttpResponse, Responder};
use serde_json::json;
use sqlx::Row;
use uuid::Uuid;

use crate::api::auth::{require_active, Gate};
use crate::api::stripe_client;
use crate::{db, AppState};

/// Creates a processor payment intent for an appointment and records a
/// `pending` payment row keyed by the intent id. The webhook flips both the
/// payment and the appointment on confirmation.
#[utoipa::path(
    post,
    path = "/api/appointments/{id}/pay",
    tag = "payments",
    responses(
        (status = 200, description = "Payment intent created"),
        (status = 400, description = "Appointment not payable"),
        (status = 403, description = "Not the booking client"),
        (status = 404, description = "Appointment not found")
    )
)]
#[post("/appointments/{id}/pay")]
pub async fn create_payment(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    path: web::Path<i32>,
) -> impl Responder {
    let user_id = *user_id;
    let appointment_id = path.into_inner();

    if let Gate::Forbidden(resp) = require_active(&state.pool, user_id).await {
        return resp;
    }

    let appointment = match db::get_appointment(&state.pool, appointment_id).await {
        Ok(Some(a)) => a,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({"error": "appointment not found"}))
        }
        Err(e) => {
            log::error!("create_payment lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if appointment.client_id != user_id {
        return HttpResponse::Forbidden().json(json!({"error": "not your appointment"}));
    }
    if appointment.status != "pending" && appointment.status != "confirmed" {
        return HttpResponse::BadRequest().json(json!({
            "error": format!("cannot pay for a {} appointment", appointment.status)
        }));
    }
    if appointment.payment_status != "unpaid" {
        return HttpResponse::BadRequest().json(json!({"error": "appointment is already paid"}));
    }

    let (intent_id, client_secret) =
        if std::env::var("MOCK_STRIPE").unwrap_or_default() == "true" {
            let id = format!("pi_mock_{}", Uuid::new_v4().simple());
            let secret = format!("{id}_secret");
            (id, Some(secret))
        } else {
            match stripe_client::create_payment_intent(
                &state.stripe_secret_key,
                appointment.amount_cents,
                &appointment.currency,
                appointment.id,
            )
            .await
            {
                Ok(intent) => (intent.id, intent.client_secret),
                Err(e) => {
                    log::error!(
                        "stripe create_payment_intent error: {e} appointment={appointment_id}"
                    );
                    return HttpResponse::InternalServerError().json(json!({
                        "error": "payment intent creation failed"
                    }));
                }
            }
        };

    let row = match sqlx::query(
        r#"INSERT INTO payments (appointment_id, client_id, amount_cents, currency, payment_intent_id)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING id"#,
    )
    .bind(appointment.id)
    .bind(user_id)
    .bind(appointment.amount_cents)
    .bind(&appointment.currency)
    .bind(&intent_id)
    .fetch_one(&state.pool)
    .await
    {
        Ok(r) => r,
        Err(e) => {
            log::error!("create_payment insert error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let payment_id: i32 = row.get("id");
    log::info!(
        "payment intent created payment={payment_id} appointment={appointment_id} intent={intent_id}"
    );

    HttpResponse::Ok().json(json!({
        "payment_id": payment_id,
        "payment_intent_id": intent_id,
        "client_secret": client_secret,
        "amount_cents": appointment.amount_cents,
        "currency": appointment.currency,
    }))
}

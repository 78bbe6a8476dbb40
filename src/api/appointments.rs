// src/api/appointments.rs

use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::auth::{require_active, require_role, Gate};
use crate::models::Appointment;
use crate::{billing, db, video, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct BookAppointmentRequest {
    pub therapist_id: i32,
    pub scheduled_at: DateTime<Utc>,
    /// Defaults to 60.
    pub duration_minutes: Option<i32>,
}

#[utoipa::path(
    post,
    path = "/api/appointments",
    tag = "appointments",
    request_body = BookAppointmentRequest,
    responses(
        (status = 200, description = "Appointment booked", body = Appointment),
        (status = 400, description = "Bookings disabled, bad time, or unverified therapist"),
        (status = 404, description = "Therapist not found")
    )
)]
#[post("/appointments")]
pub async fn book_appointment(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    payload: web::Json<BookAppointmentRequest>,
) -> impl Responder {
    let client_id = *user_id;

    if let Gate::Forbidden(resp) = require_role(&state.pool, client_id, "client").await {
        return resp;
    }

    let settings = match db::get_platform_settings(&state.pool).await {
        Ok(s) => s,
        Err(e) => {
            log::error!("book settings error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };
    if !settings.bookings_enabled {
        return HttpResponse::BadRequest().json(json!({
            "error": "bookings are temporarily disabled"
        }));
    }

    let duration = payload.duration_minutes.unwrap_or(60);
    if !(15..=180).contains(&duration) {
        return HttpResponse::BadRequest().json(json!({
            "error": "duration must be between 15 and 180 minutes"
        }));
    }
    if payload.scheduled_at <= Utc::now() {
        return HttpResponse::BadRequest().json(json!({"error": "scheduled time is in the past"}));
    }

    let profile = match db::get_therapist_profile(&state.pool, payload.therapist_id).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({"error": "therapist not found"}))
        }
        Err(e) => {
            log::error!("book therapist lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };
    if !profile.is_verified {
        return HttpResponse::BadRequest().json(json!({"error": "therapist is not verified"}));
    }

    let amount_cents = billing::session_amount_cents(profile.hourly_rate_cents, duration);
    let channel_name = format!("session-{}", Uuid::new_v4());

    let row = match sqlx::query(
        r#"INSERT INTO appointments
               (client_id, therapist_id, scheduled_at, duration_minutes, amount_cents,
                currency, channel_name)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING id"#,
    )
    .bind(client_id)
    .bind(payload.therapist_id)
    .bind(payload.scheduled_at)
    .bind(duration)
    .bind(amount_cents)
    .bind(&profile.currency)
    .bind(&channel_name)
    .fetch_one(&state.pool)
    .await
    {
        Ok(r) => r,
        Err(e) => {
            log::error!("book insert error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let appointment_id: i32 = row.get("id");
    log::info!(
        "appointment booked id={appointment_id} client={client_id} therapist={} amount={amount_cents}",
        payload.therapist_id
    );

    match db::get_appointment(&state.pool, appointment_id).await {
        Ok(Some(a)) => HttpResponse::Ok().json(a),
        _ => HttpResponse::InternalServerError().finish(),
    }
}

#[get("/appointments")]
pub async fn list_appointments(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
) -> impl Responder {
    match db::list_appointments_for_user(&state.pool, *user_id).await {
        Ok(appointments) => HttpResponse::Ok().json(appointments),
        Err(e) => {
            log::error!("list_appointments db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[post("/appointments/{id}/cancel")]
pub async fn cancel_appointment(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    path: web::Path<i32>,
    payload: web::Json<CancelRequest>,
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
            log::error!("cancel lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if appointment.client_id != user_id && appointment.therapist_id != user_id {
        return HttpResponse::Forbidden().json(json!({"error": "not your appointment"}));
    }
    if appointment.status != "pending" && appointment.status != "confirmed" {
        return HttpResponse::BadRequest().json(json!({
            "error": format!("cannot cancel a {} appointment", appointment.status)
        }));
    }

    if let Err(e) = sqlx::query(
        r#"UPDATE appointments
           SET status = 'cancelled', cancel_reason = $1, updated_at = NOW()
           WHERE id = $2"#,
    )
    .bind(payload.reason.as_deref())
    .bind(appointment_id)
    .execute(&state.pool)
    .await
    {
        log::error!("cancel update error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    // Paid cancellations are refunded by an admin through /api/admin/refunds.
    HttpResponse::Ok().json(json!({
        "ok": true,
        "refund_required": appointment.payment_status == "paid",
    }))
}

#[post("/appointments/{id}/complete")]
pub async fn complete_appointment(
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
            log::error!("complete lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if appointment.therapist_id != user_id {
        return HttpResponse::Forbidden().json(json!({
            "error": "only the therapist can complete an appointment"
        }));
    }
    if appointment.status != "confirmed" || appointment.payment_status != "paid" {
        return HttpResponse::BadRequest().json(json!({
            "error": "appointment must be confirmed and paid"
        }));
    }

    if let Err(e) =
        sqlx::query("UPDATE appointments SET status = 'completed', updated_at = NOW() WHERE id = $1")
            .bind(appointment_id)
            .execute(&state.pool)
            .await
    {
        log::error!("complete update error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    log::info!("appointment completed id={appointment_id} therapist={user_id}");
    HttpResponse::Ok().json(json!({"ok": true}))
}

/// Time-limited video credential for a confirmed session. Either participant
/// can fetch it; the token expires an hour after the scheduled end.
#[get("/appointments/{id}/session-token")]
pub async fn session_token(
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
            log::error!("session_token lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if appointment.client_id != user_id && appointment.therapist_id != user_id {
        return HttpResponse::Forbidden().json(json!({"error": "not your appointment"}));
    }
    if appointment.status != "confirmed" {
        return HttpResponse::BadRequest().json(json!({
            "error": "session tokens are only issued for confirmed appointments"
        }));
    }

    let session_end = appointment.scheduled_at
        + chrono::Duration::minutes(appointment.duration_minutes as i64);
    let expires_at = (session_end + chrono::Duration::hours(1)).timestamp();
    if expires_at <= Utc::now().timestamp() {
        return HttpResponse::BadRequest().json(json!({"error": "session window has passed"}));
    }

    let credential = video::build_channel_token_at(
        &state.agora_app_id,
        &state.agora_app_certificate,
        &appointment.channel_name,
        user_id as u32,
        expires_at,
    );

    HttpResponse::Ok().json(json!({
        "app_id": state.agora_app_id,
        "channel_name": credential.channel_name,
        "uid": credential.uid,
        "token": credential.token,
        "expires_at": credential.expires_at,
    }))
}

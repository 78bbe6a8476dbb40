// src/api/reviews.rs

use actix_web::{post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use utoipa::ToSchema;

use crate::api::auth::{require_role, Gate};
use crate::{db, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReviewRequest {
    pub appointment_id: i32,
    pub rating: i32,
    pub comment: Option<String>,
}

/// Client reviews a completed appointment. Reviews land in the moderation
/// queue (`pending`, not public) until an admin approves them.
#[post("/reviews")]
pub async fn create_review(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    payload: web::Json<CreateReviewRequest>,
) -> impl Responder {
    let user_id = *user_id;

    if let Gate::Forbidden(resp) = require_role(&state.pool, user_id, "client").await {
        return resp;
    }

    if !(1..=5).contains(&payload.rating) {
        return HttpResponse::BadRequest().json(json!({"error": "rating must be 1..5"}));
    }

    let appointment = match db::get_appointment(&state.pool, payload.appointment_id).await {
        Ok(Some(a)) => a,
        Ok(None) => {
            return HttpResponse::NotFound().json(json!({"error": "appointment not found"}))
        }
        Err(e) => {
            log::error!("create_review lookup error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if appointment.client_id != user_id {
        return HttpResponse::Forbidden().json(json!({"error": "not your appointment"}));
    }
    if appointment.status != "completed" {
        return HttpResponse::BadRequest().json(json!({
            "error": "only completed appointments can be reviewed"
        }));
    }

    let row = match sqlx::query(
        r#"INSERT INTO reviews (appointment_id, client_id, therapist_id, rating, comment)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING id"#,
    )
    .bind(appointment.id)
    .bind(user_id)
    .bind(appointment.therapist_id)
    .bind(payload.rating)
    .bind(payload.comment.as_deref())
    .fetch_one(&state.pool)
    .await
    {
        Ok(r) => r,
        // unique(appointment_id) — one review per appointment
        Err(e) => {
            log::warn!("create_review insert error: {e}");
            return HttpResponse::BadRequest().json(json!({
                "error": "appointment already reviewed"
            }));
        }
    };

    let review_id: i32 = row.get("id");
    HttpResponse::Ok().json(json!({
        "review_id": review_id,
        "status": "pending",
    }))
}

// src/api/therapists.rs

use actix_web::{get, put, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::api::auth::{require_role, Gate};
use crate::{db, AppState};

#[get("/therapists")]
pub async fn list_therapists(state: web::Data<AppState>) -> impl Responder {
    match db::list_verified_therapists(&state.pool).await {
        Ok(profiles) => HttpResponse::Ok().json(profiles),
        Err(e) => {
            log::error!("list_therapists db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/therapists/{id}")]
pub async fn get_therapist(state: web::Data<AppState>, path: web::Path<i32>) -> impl Responder {
    let therapist_id = path.into_inner();

    match db::get_therapist_profile(&state.pool, therapist_id).await {
        Ok(Some(profile)) if profile.is_verified => HttpResponse::Ok().json(profile),
        // unverified profiles are invisible to the public directory
        Ok(_) => HttpResponse::NotFound().json(json!({"error": "therapist not found"})),
        Err(e) => {
            log::error!("get_therapist db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/therapists/{id}/reviews")]
pub async fn list_therapist_reviews(
    state: web::Data<AppState>,
    path: web::Path<i32>,
) -> impl Responder {
    match db::list_public_reviews_for_therapist(&state.pool, path.into_inner()).await {
        Ok(reviews) => HttpResponse::Ok().json(reviews),
        Err(e) => {
            log::error!("list_therapist_reviews db error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertProfileRequest {
    pub license_number: String,
    pub specializations: Option<Vec<String>>,
    pub bio: Option<String>,
    pub hourly_rate_cents: i64,
    pub currency: Option<String>,
    pub years_experience: Option<i32>,
    pub availability: Option<serde_json::Value>,
    pub stripe_account_id: Option<String>,
}

/// Therapist submits or updates their practice details. Any change drops the
/// verification flag so the profile goes back through admin moderation.
#[put("/therapist/profile")]
pub async fn upsert_profile(
    state: web::Data<AppState>,
    user_id: web::ReqData<i32>,
    payload: web::Json<UpsertProfileRequest>,
) -> impl Responder {
    let user_id = *user_id;

    if let Gate::Forbidden(resp) = require_role(&state.pool, user_id, "therapist").await {
        return resp;
    }

    if payload.hourly_rate_cents <= 0 {
        return HttpResponse::BadRequest().json(json!({"error": "hourly rate must be positive"}));
    }
    if payload.license_number.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "license number required"}));
    }

    let result = sqlx::query(
        r#"INSERT INTO therapist_profiles
               (user_id, license_number, specializations, bio, hourly_rate_cents, currency,
                years_experience, availability, stripe_account_id)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
           ON CONFLICT (user_id)
           DO UPDATE SET
               license_number = EXCLUDED.license_number,
               specializations = EXCLUDED.specializations,
               bio = EXCLUDED.bio,
               hourly_rate_cents = EXCLUDED.hourly_rate_cents,
               currency = EXCLUDED.currency,
               years_experience = EXCLUDED.years_experience,
               availability = EXCLUDED.availability,
               stripe_account_id = EXCLUDED.stripe_account_id,
               is_verified = false,
               verified_at = NULL,
               updated_at = NOW()"#,
    )
    .bind(user_id)
    .bind(payload.license_number.trim())
    .bind(payload.specializations.clone().unwrap_or_default())
    .bind(payload.bio.as_deref())
    .bind(payload.hourly_rate_cents)
    .bind(payload.currency.as_deref().unwrap_or("usd"))
    .bind(payload.years_experience)
    .bind(payload.availability.clone())
    .bind(payload.stripe_account_id.as_deref())
    .execute(&state.pool)
    .await;

    if let Err(e) = result {
        log::error!("upsert_profile db error: {e}");
        return HttpResponse::InternalServerError().finish();
    }

    match db::get_therapist_profile(&state.pool, user_id).await {
        Ok(Some(profile)) => HttpResponse::Ok().json(profile),
        Ok(None) => HttpResponse::InternalServerError().finish(),
        Err(e) => {
            log::error!("upsert_profile reload error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/me")]
pub async fn me(state: web::Data<AppState>, user_id: web::ReqData<i32>) -> impl Responder {
    let user_id = *user_id;

    let user = match db::get_user(&state.pool, user_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return HttpResponse::NotFound().json(json!({"error": "user not found"})),
        Err(e) => {
            log::error!("me db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let profile = match db::get_therapist_profile(&state.pool, user_id).await {
        Ok(p) => p,
        Err(e) => {
            log::error!("me profile db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    HttpResponse::Ok().json(json!({
        "user": user,
        "therapist_profile": profile,
    }))
}

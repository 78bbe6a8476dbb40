// src/api/payouts.rs
//
// The payout-eligibility sweep: a cron-triggered batch that turns completed,
// paid appointments past the grace period into therapist payouts. Sequential
// over a bounded result set; each appointment is claimed atomically and the
// payouts table carries UNIQUE(appointment_id), so a payout is created at
// most once even under overlapping cron triggers.

use actix_web::{post, web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::api::stripe_client;
use crate::models::Appointment;
use crate::{billing, db, AppState};

#[derive(Debug, Default)]
struct SweepStats {
    examined: usize,
    completed: usize,
    failed: usize,
    skipped: usize,
}

#[utoipa::path(
    post,
    path = "/cron/payouts",
    tag = "payouts",
    responses(
        (status = 200, description = "Sweep summary"),
        (status = 401, description = "Bad or missing cron secret")
    )
)]
#[post("/cron/payouts")]
pub async fn run_payout_sweep(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let bearer = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or("");

    if bearer.is_empty() || bearer != state.cron_secret {
        return HttpResponse::Unauthorized().json(json!({"error": "invalid cron secret"}));
    }

    let settings = match db::get_platform_settings(&state.pool).await {
        Ok(s) => s,
        Err(e) => {
            log::error!("payout sweep settings error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let eligible =
        match db::payout_eligible_appointments(&state.pool, settings.payout_delay_days).await {
            Ok(v) => v,
            Err(e) => {
                log::error!("payout sweep query error: {e}");
                return HttpResponse::InternalServerError().finish();
            }
        };

    let mut stats = SweepStats {
        examined: eligible.len(),
        ..Default::default()
    };

    for appointment in &eligible {
        match process_one(&state, appointment, settings.commission_rate).await {
            Ok(Outcome::Completed) => stats.completed += 1,
            Ok(Outcome::Failed) => stats.failed += 1,
            Ok(Outcome::Skipped) => stats.skipped += 1,
            Err(e) => {
                log::error!(
                    "payout sweep db error appointment={}: {e}",
                    appointment.id
                );
                stats.failed += 1;
            }
        }
    }

    log::info!(
        "payout sweep done examined={} completed={} failed={} skipped={}",
        stats.examined,
        stats.completed,
        stats.failed,
        stats.skipped
    );

    HttpResponse::Ok().json(json!({
        "examined": stats.examined,
        "completed": stats.completed,
        "failed": stats.failed,
        "skipped": stats.skipped,
    }))
}

enum Outcome {
    Completed,
    Failed,
    Skipped,
}

async fn process_one(
    state: &AppState,
    appointment: &Appointment,
    commission_rate: f64,
) -> Result<Outcome, sqlx::Error> {
    // Another sweep instance may be racing us; the claim decides ownership.
    if !db::claim_appointment_for_payout(&state.pool, appointment.id).await? {
        return Ok(Outcome::Skipped);
    }

    // Once claimed, the appointment never comes back to the sweep, so every
    // error from here on must still leave a payouts row for the admin ledger.
    match settle_claimed(state, appointment, commission_rate).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            log::error!(
                "payout sweep error after claim appointment={}: {e}",
                appointment.id
            );
            let split = billing::fee_split(appointment.amount_cents, commission_rate);
            if let Err(e2) = record_failed_payout(
                &state.pool,
                appointment,
                None,
                &split,
                &format!("sweep error: {e}"),
            )
            .await
            {
                log::error!(
                    "payout sweep could not record failure appointment={}: {e2}",
                    appointment.id
                );
            }
            Ok(Outcome::Failed)
        }
    }
}

async fn settle_claimed(
    state: &AppState,
    appointment: &Appointment,
    commission_rate: f64,
) -> Result<Outcome, sqlx::Error> {
    let payment = db::get_succeeded_payment_for_appointment(&state.pool, appointment.id).await?;
    let split_amount = payment
        .as_ref()
        .map(|p| p.amount_cents)
        .unwrap_or(appointment.amount_cents);
    let split = billing::fee_split(split_amount, commission_rate);

    let Some(payment) = payment else {
        log::warn!(
            "payout sweep: no succeeded payment for appointment={}",
            appointment.id
        );
        record_failed_payout(
            &state.pool,
            appointment,
            None,
            &split,
            "no succeeded payment on record",
        )
        .await?;
        return Ok(Outcome::Failed);
    };

    let profile = db::get_therapist_profile(&state.pool, appointment.therapist_id).await?;
    let Some(destination) = profile.and_then(|p| p.stripe_account_id) else {
        log::warn!(
            "payout sweep: therapist={} has no payout account (appointment={})",
            appointment.therapist_id,
            appointment.id
        );
        record_failed_payout(
            &state.pool,
            appointment,
            Some(payment.id),
            &split,
            "therapist has no connected payout account",
        )
        .await?;
        return Ok(Outcome::Failed);
    };

    // UNIQUE(appointment_id): a leftover row from an earlier run wins.
    let inserted = sqlx::query(
        r#"INSERT INTO payouts
               (therapist_id, appointment_id, payment_id, gross_amount_cents,
                platform_fee_cents, net_amount_cents, currency, status)
           VALUES ($1, $2, $3, $4, $5, $6, $7, 'processing')
           ON CONFLICT (appointment_id) DO NOTHING
           RETURNING id"#,
    )
    .bind(appointment.therapist_id)
    .bind(appointment.id)
    .bind(payment.id)
    .bind(split.gross_cents)
    .bind(split.platform_fee_cents)
    .bind(split.net_cents)
    .bind(&appointment.currency)
    .fetch_optional(&state.pool)
    .await?;

    let Some(row) = inserted else {
        return Ok(Outcome::Skipped);
    };
    let payout_id: i32 = row.get("id");

    let transfer = if std::env::var("MOCK_STRIPE").unwrap_or_default() == "true" {
        Ok(format!("tr_mock_{}", Uuid::new_v4().simple()))
    } else {
        stripe_client::create_transfer(
            &state.stripe_secret_key,
            split.net_cents,
            &appointment.currency,
            &destination,
            &format!("appointment-{}", appointment.id),
        )
        .await
        .map(|t| t.id)
    };

    match transfer {
        Ok(transfer_id) => {
            sqlx::query(
                r#"UPDATE payouts
                   SET status = 'completed', transfer_id = $1, completed_at = NOW()
                   WHERE id = $2"#,
            )
            .bind(&transfer_id)
            .bind(payout_id)
            .execute(&state.pool)
            .await?;

            log::info!(
                "payout completed payout={payout_id} appointment={} net={} fee={} transfer={transfer_id}",
                appointment.id,
                split.net_cents,
                split.platform_fee_cents
            );
            Ok(Outcome::Completed)
        }
        Err(e) => {
            log::error!(
                "stripe transfer error payout={payout_id} appointment={}: {e}",
                appointment.id
            );
            sqlx::query("UPDATE payouts SET status = 'failed', failure_reason = $1 WHERE id = $2")
                .bind(e.to_string())
                .bind(payout_id)
                .execute(&state.pool)
                .await?;
            Ok(Outcome::Failed)
        }
    }
}

async fn record_failed_payout(
    pool: &PgPool,
    appointment: &Appointment,
    payment_id: Option<i32>,
    split: &billing::FeeSplit,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO payouts
               (therapist_id, appointment_id, payment_id, gross_amount_cents,
                platform_fee_cents, net_amount_cents, currency, status, failure_reason)
           VALUES ($1, $2, $3, $4, $5, $6, $7, 'failed', $8)
           ON CONFLICT (appointment_id) DO NOTHING"#,
    )
    .bind(appointment.therapist_id)
    .bind(appointment.id)
    .bind(payment_id)
    .bind(split.gross_cents)
    .bind(split.platform_fee_cents)
    .bind(split.net_cents)
    .bind(&appointment.currency)
    .bind(reason)
    .execute(pool)
    .await?;

    Ok(())
}

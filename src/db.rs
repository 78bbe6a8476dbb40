// src/db.rs

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::{Appointment, Payment, Payout, PlatformSettings, Review, TherapistProfile, User};

fn user_from_row(r: &PgRow) -> User {
    User {
        id: r.get("id"),
        email: r.get("email"),
        display_name: r.get("display_name"),
        role: r.get("role"),
        status: r.get("status"),
        created_at: r.get("created_at"),
    }
}

fn profile_from_row(r: &PgRow) -> TherapistProfile {
    TherapistProfile {
        user_id: r.get("user_id"),
        license_number: r.get("license_number"),
        specializations: r.get("specializations"),
        bio: r.get("bio"),
        hourly_rate_cents: r.get("hourly_rate_cents"),
        currency: r.get("currency"),
        years_experience: r.get("years_experience"),
        availability: r.get("availability"),
        stripe_account_id: r.get("stripe_account_id"),
        is_verified: r.get("is_verified"),
        verified_at: r.get("verified_at"),
        is_featured: r.get("is_featured"),
    }
}

fn appointment_from_row(r: &PgRow) -> Appointment {
    Appointment {
        id: r.get("id"),
        client_id: r.get("client_id"),
        therapist_id: r.get("therapist_id"),
        scheduled_at: r.get("scheduled_at"),
        duration_minutes: r.get("duration_minutes"),
        status: r.get("status"),
        payment_status: r.get("payment_status"),
        amount_cents: r.get("amount_cents"),
        currency: r.get("currency"),
        channel_name: r.get("channel_name"),
        payout_created: r.get("payout_created"),
        cancel_reason: r.get("cancel_reason"),
        created_at: r.get("created_at"),
    }
}

fn payment_from_row(r: &PgRow) -> Payment {
    Payment {
        id: r.get("id"),
        appointment_id: r.get("appointment_id"),
        client_id: r.get("client_id"),
        amount_cents: r.get("amount_cents"),
        currency: r.get("currency"),
        status: r.get("status"),
        payment_intent_id: r.get("payment_intent_id"),
        paid_at: r.get("paid_at"),
        created_at: r.get("created_at"),
    }
}

fn payout_from_row(r: &PgRow) -> Payout {
    Payout {
        id: r.get("id"),
        therapist_id: r.get("therapist_id"),
        appointment_id: r.get("appointment_id"),
        payment_id: r.get("payment_id"),
        gross_amount_cents: r.get("gross_amount_cents"),
        platform_fee_cents: r.get("platform_fee_cents"),
        net_amount_cents: r.get("net_amount_cents"),
        currency: r.get("currency"),
        status: r.get("status"),
        transfer_id: r.get("transfer_id"),
        failure_reason: r.get("failure_reason"),
        created_at: r.get("created_at"),
        completed_at: r.get("completed_at"),
    }
}

fn review_from_row(r: &PgRow) -> Review {
    Review {
        id: r.get("id"),
        appointment_id: r.get("appointment_id"),
        client_id: r.get("client_id"),
        therapist_id: r.get("therapist_id"),
        rating: r.get("rating"),
        comment: r.get("comment"),
        status: r.get("status"),
        is_public: r.get("is_public"),
        created_at: r.get("created_at"),
    }
}

pub async fn get_user(pool: &PgPool, user_id: i32) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, email, display_name, role, status, created_at
           FROM users WHERE id = $1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| user_from_row(&r)))
}

/// Role + account status in one read. The auth middleware only proves the
/// token; role decisions always come from the current user row.
pub async fn get_user_gate(
    pool: &PgPool,
    user_id: i32,
) -> Result<Option<(String, String)>, sqlx::Error> {
    let row = sqlx::query("SELECT role, status FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| (r.get("role"), r.get("status"))))
}

pub async fn get_platform_settings(pool: &PgPool) -> Result<PlatformSettings, sqlx::Error> {
    let r = sqlx::query(
        r#"SELECT commission_rate, payout_delay_days, bookings_enabled, updated_at
           FROM platform_settings WHERE id = 1"#,
    )
    .fetch_one(pool)
    .await?;

    Ok(PlatformSettings {
        commission_rate: r.get("commission_rate"),
        payout_delay_days: r.get("payout_delay_days"),
        bookings_enabled: r.get("bookings_enabled"),
        updated_at: r.get("updated_at"),
    })
}

pub async fn get_therapist_profile(
    pool: &PgPool,
    user_id: i32,
) -> Result<Option<TherapistProfile>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT user_id, license_number, specializations, bio, hourly_rate_cents, currency,
                  years_experience, availability, stripe_account_id, is_verified, verified_at, is_featured
           FROM therapist_profiles WHERE user_id = $1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| profile_from_row(&r)))
}

pub async fn list_verified_therapists(pool: &PgPool) -> Result<Vec<TherapistProfile>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT user_id, license_number, specializations, bio, hourly_rate_cents, currency,
                  years_experience, availability, stripe_account_id, is_verified, verified_at, is_featured
           FROM therapist_profiles
           WHERE is_verified = true
           ORDER BY is_featured DESC, user_id ASC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(profile_from_row).collect())
}

pub async fn list_unverified_therapists(
    pool: &PgPool,
) -> Result<Vec<TherapistProfile>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT user_id, license_number, specializations, bio, hourly_rate_cents, currency,
                  years_experience, availability, stripe_account_id, is_verified, verified_at, is_featured
           FROM therapist_profiles
           WHERE is_verified = false
           ORDER BY created_at ASC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(profile_from_row).collect())
}

pub async fn get_appointment(
    pool: &PgPool,
    appointment_id: i32,
) -> Result<Option<Appointment>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, client_id, therapist_id, scheduled_at, duration_minutes, status,
                  payment_status, amount_cents, currency, channel_name, payout_created,
                  cancel_reason, created_at
           FROM appointments WHERE id = $1"#,
    )
    .bind(appointment_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| appointment_from_row(&r)))
}

pub async fn list_appointments_for_user(
    pool: &PgPool,
    user_id: i32,
) -> Result<Vec<Appointment>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, client_id, therapist_id, scheduled_at, duration_minutes, status,
                  payment_status, amount_cents, currency, channel_name, payout_created,
                  cancel_reason, created_at
           FROM appointments
           WHERE client_id = $1 OR therapist_id = $1
           ORDER BY scheduled_at DESC"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(appointment_from_row).collect())
}

/// Appointments ready for a payout: completed, paid for, not yet swept, and
/// past the platform grace period.
pub async fn payout_eligible_appointments(
    pool: &PgPool,
    delay_days: i32,
) -> Result<Vec<Appointment>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, client_id, therapist_id, scheduled_at, duration_minutes, status,
                  payment_status, amount_cents, currency, channel_name, payout_created,
                  cancel_reason, created_at
           FROM appointments
           WHERE status = 'completed'
             AND payment_status = 'paid'
             AND payout_created = false
             AND scheduled_at <= NOW() - make_interval(days => $1)
           ORDER BY scheduled_at ASC"#,
    )
    .bind(delay_days)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(appointment_from_row).collect())
}

/// Atomically claims an appointment for payout. Returns false when another
/// sweep already took it, so concurrent cron triggers cannot double-pay.
pub async fn claim_appointment_for_payout(
    pool: &PgPool,
    appointment_id: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE appointments SET payout_created = true, updated_at = NOW()
           WHERE id = $1 AND payout_created = false"#,
    )
    .bind(appointment_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn get_payment(pool: &PgPool, payment_id: i32) -> Result<Option<Payment>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, appointment_id, client_id, amount_cents, currency, status,
                  payment_intent_id, paid_at, created_at
           FROM payments WHERE id = $1"#,
    )
    .bind(payment_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| payment_from_row(&r)))
}

pub async fn get_payment_by_intent(
    pool: &PgPool,
    payment_intent_id: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, appointment_id, client_id, amount_cents, currency, status,
                  payment_intent_id, paid_at, created_at
           FROM payments WHERE payment_intent_id = $1"#,
    )
    .bind(payment_intent_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| payment_from_row(&r)))
}

pub async fn get_succeeded_payment_for_appointment(
    pool: &PgPool,
    appointment_id: i32,
) -> Result<Option<Payment>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT id, appointment_id, client_id, amount_cents, currency, status,
                  payment_intent_id, paid_at, created_at
           FROM payments
           WHERE appointment_id = $1 AND status = 'succeeded'
           ORDER BY created_at DESC
           LIMIT 1"#,
    )
    .bind(appointment_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| payment_from_row(&r)))
}

pub async fn list_payouts(pool: &PgPool) -> Result<Vec<Payout>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, therapist_id, appointment_id, payment_id, gross_amount_cents,
                  platform_fee_cents, net_amount_cents, currency, status, transfer_id,
                  failure_reason, created_at, completed_at
           FROM payouts
           ORDER BY created_at DESC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(payout_from_row).collect())
}

pub async fn list_pending_reviews(pool: &PgPool) -> Result<Vec<Review>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, appointment_id, client_id, therapist_id, rating, comment, status,
                  is_public, created_at
           FROM reviews
           WHERE status = 'pending'
           ORDER BY created_at ASC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(review_from_row).collect())
}

pub async fn list_public_reviews_for_therapist(
    pool: &PgPool,
    therapist_id: i32,
) -> Result<Vec<Review>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, appointment_id, client_id, therapist_id, rating, comment, status,
                  is_public, created_at
           FROM reviews
           WHERE therapist_id = $1 AND status = 'approved' AND is_public = true
           ORDER BY created_at DESC"#,
    )
    .bind(therapist_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(review_from_row).collect())
}

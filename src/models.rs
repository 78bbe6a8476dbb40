// src/models.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,   // client | therapist | admin
    pub status: String, // active | suspended
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TherapistProfile {
    pub user_id: i32,
    pub license_number: String,
    pub specializations: Vec<String>,
    pub bio: Option<String>,
    pub hourly_rate_cents: i64,
    pub currency: String,
    pub years_experience: Option<i32>,
    pub availability: Option<serde_json::Value>,
    pub stripe_account_id: Option<String>,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub is_featured: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Appointment {
    pub id: i32,
    pub client_id: i32,
    pub therapist_id: i32,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: String,         // pending | confirmed | completed | cancelled
    pub payment_status: String, // unpaid | paid | refunded
    pub amount_cents: i64,
    pub currency: String,
    pub channel_name: String,
    pub payout_created: bool,
    pub cancel_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Payment {
    pub id: i32,
    pub appointment_id: i32,
    pub client_id: i32,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String, // pending | succeeded | failed | refunded
    pub payment_intent_id: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Payout {
    pub id: i32,
    pub therapist_id: i32,
    pub appointment_id: i32,
    pub payment_id: Option<i32>,
    pub gross_amount_cents: i64,
    pub platform_fee_cents: i64,
    pub net_amount_cents: i64,
    pub currency: String,
    pub status: String, // pending | processing | completed | failed
    pub transfer_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Refund {
    pub id: i32,
    pub payment_id: i32,
    pub appointment_id: Option<i32>,
    pub amount_cents: i64,
    pub reason: Option<String>,
    pub status: String, // pending | processing | completed | failed
    pub provider_refund_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Review {
    pub id: i32,
    pub appointment_id: i32,
    pub client_id: i32,
    pub therapist_id: i32,
    pub rating: i32,
    pub comment: Option<String>,
    pub status: String, // pending | approved | rejected
    pub is_public: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlatformSettings {
    pub commission_rate: f64,
    pub payout_delay_days: i32,
    pub bookings_enabled: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

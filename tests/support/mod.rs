use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::env;
use std::sync::OnceLock;
use tokio::sync::{Mutex, MutexGuard};

use calmbook::AppState;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_CRON_SECRET: &str = "test-cron-secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test123secret456";

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

pub async fn init_test_db() -> TestDb {
    dotenvy::dotenv().ok();
    env::set_var("JWT_SECRET", TEST_JWT_SECRET);
    env::set_var("MOCK_STRIPE", "true");
    env::set_var("MOCK_MAIL", "true");

    let test_url = env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let (admin_url, db_name) = split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url).await.expect("connect admin db");

    let _ = sqlx::query("SELECT pg_advisory_lock(424242)")
        .execute(&admin_pool)
        .await;

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    let create_result = sqlx::query(&create_sql).execute(&admin_pool).await;
    if let Err(e) = create_result {
        eprintln!("create test db error: {e}");
        let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
        sqlx::query(&create_sql)
            .execute(&admin_pool)
            .await
            .expect("create test db retry");
    }

    let _ = sqlx::query("SELECT pg_advisory_unlock(424242)")
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;

    let pool = PgPool::connect(&test_url).await.expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    TestDb { pool, _guard: guard }
}

pub fn build_state(pool: PgPool) -> AppState {
    AppState {
        pool,
        stripe_secret_key: "sk_test_xxx".to_string(),
        stripe_webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        agora_app_id: "test-app-id".to_string(),
        agora_app_certificate: "test-app-certificate".to_string(),
        cron_secret: TEST_CRON_SECRET.to_string(),
        mail_api_key: "test-mail".to_string(),
        mail_from: "no-reply@test.local".to_string(),
    }
}

#[derive(Serialize)]
struct TestClaims {
    sub: i32,
    exp: usize,
}

/// Mints a token the app's JWT middleware accepts.
pub fn make_jwt(user_id: i32) -> String {
    let exp = (Utc::now() + Duration::hours(1)).timestamp() as usize;
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &TestClaims { sub: user_id, exp },
        &jsonwebtoken::EncodingKey::from_secret(TEST_JWT_SECRET.as_ref()),
    )
    .expect("encode test jwt")
}

pub async fn seed_user(pool: &PgPool, email: &str, role: &str) -> i32 {
    sqlx::query(
        r#"INSERT INTO users (email, password_hash, role)
           VALUES ($1, 'test-hash', $2)
           RETURNING id"#,
    )
    .bind(email)
    .bind(role)
    .fetch_one(pool)
    .await
    .expect("insert user")
    .get("id")
}

pub async fn seed_therapist_profile(pool: &PgPool, user_id: i32, verified: bool) {
    sqlx::query(
        r#"INSERT INTO therapist_profiles
               (user_id, license_number, hourly_rate_cents, currency, is_verified,
                stripe_account_id)
           VALUES ($1, 'LIC-1234', 12000, 'usd', $2, 'acct_test_1')"#,
    )
    .bind(user_id)
    .bind(verified)
    .execute(pool)
    .await
    .expect("insert therapist profile");
}

/// Completed, paid appointment scheduled `days_ago` days in the past, with a
/// matching succeeded payment. Returns (appointment_id, payment_id).
pub async fn seed_paid_completed_appointment(
    pool: &PgPool,
    client_id: i32,
    therapist_id: i32,
    amount_cents: i64,
    days_ago: i64,
) -> (i32, i32) {
    let scheduled_at = Utc::now() - Duration::days(days_ago);

    let appointment_id: i32 = sqlx::query(
        r#"INSERT INTO appointments
               (client_id, therapist_id, scheduled_at, duration_minutes, status,
                payment_status, amount_cents, currency, channel_name)
           VALUES ($1, $2, $3, 60, 'completed', 'paid', $4, 'usd', $5)
           RETURNING id"#,
    )
    .bind(client_id)
    .bind(therapist_id)
    .bind(scheduled_at)
    .bind(amount_cents)
    .bind(format!("session-{client_id}-{therapist_id}-{days_ago}"))
    .fetch_one(pool)
    .await
    .expect("insert appointment")
    .get("id");

    let payment_id: i32 = sqlx::query(
        r#"INSERT INTO payments
               (appointment_id, client_id, amount_cents, currency, status,
                payment_intent_id, paid_at)
           VALUES ($1, $2, $3, 'usd', 'succeeded', $4, NOW())
           RETURNING id"#,
    )
    .bind(appointment_id)
    .bind(client_id)
    .bind(amount_cents)
    .bind(format!("pi_test_{appointment_id}"))
    .fetch_one(pool)
    .await
    .expect("insert payment")
    .get("id");

    (appointment_id, payment_id)
}

/// A valid `Stripe-Signature` header for the given body.
pub fn sign_webhook(body: &[u8], timestamp: i64) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(TEST_WEBHOOK_SECRET.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

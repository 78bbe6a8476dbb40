pub mod api;
pub mod billing;
pub mod db;
pub mod docs;
pub mod models;
pub mod video;

use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub agora_app_id: String,
    pub agora_app_certificate: String,
    pub cron_secret: String,
    pub mail_api_key: String,
    pub mail_from: String,
}

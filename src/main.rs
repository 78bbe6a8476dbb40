// src/main.rs
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use sqlx::PgPool;
use std::env;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use calmbook::{api, docs, AppState};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // JWT_SECRET is read lazily by the auth module but must exist at boot.
    env::var("JWT_SECRET").expect("JWT_SECRET required");

    let stripe_secret_key = env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY required");
    let stripe_webhook_secret =
        env::var("STRIPE_WEBHOOK_SECRET").expect("STRIPE_WEBHOOK_SECRET required");
    let agora_app_id = env::var("AGORA_APP_ID").expect("AGORA_APP_ID required");
    let agora_app_certificate =
        env::var("AGORA_APP_CERTIFICATE").expect("AGORA_APP_CERTIFICATE required");
    let cron_secret = env::var("CRON_SECRET").expect("CRON_SECRET required");
    let mail_api_key = env::var("MAIL_API_KEY").unwrap_or_default();
    let mail_from =
        env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@calmbook.app".to_string());

    let state = web::Data::new(AppState {
        pool,
        stripe_secret_key,
        stripe_webhook_secret,
        agora_app_id,
        agora_app_certificate,
        cron_secret,
        mail_api_key,
        mail_from,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            // Public routes
            .service(api::auth::register)
            .service(api::auth::login)
            .service(api::therapists::list_therapists)
            .service(api::therapists::get_therapist)
            .service(api::therapists::list_therapist_reviews)
            // Processor callback and cron trigger (authenticated by signature / shared secret)
            .service(api::webhooks::stripe_webhook)
            .service(api::payouts::run_payout_sweep)
            // Authenticated routes
            .service(
                web::scope("/api")
                    .wrap(api::auth::JwtMiddleware)
                    .service(api::therapists::me)
                    .service(api::therapists::upsert_profile)
                    .service(api::appointments::book_appointment)
                    .service(api::appointments::list_appointments)
                    .service(api::appointments::cancel_appointment)
                    .service(api::appointments::complete_appointment)
                    .service(api::appointments::session_token)
                    .service(api::payments::create_payment)
                    .service(api::reviews::create_review)
                    .service(
                        web::scope("/admin")
                            .service(api::admin::list_pending_therapists)
                            .service(api::admin::verify_therapist)
                            .service(api::admin::feature_therapist)
                            .service(api::admin::list_pending_reviews)
                            .service(api::admin::approve_review)
                            .service(api::admin::reject_review)
                            .service(api::admin::suspend_user)
                            .service(api::admin::list_payouts)
                            .service(api::admin::create_refund)
                            .service(api::admin::get_settings)
                            .service(api::admin::update_settings),
                    ),
            )
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}

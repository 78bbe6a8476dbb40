use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::Row;

use calmbook::api::appointments::{
    book_appointment, cancel_appointment, complete_appointment, list_appointments, session_token,
};
use calmbook::api::auth::JwtMiddleware;
use calmbook::api::payments::create_payment;
use calmbook::api::reviews::create_review;
use calmbook::api::therapists::upsert_profile;

mod support;

macro_rules! build_app {
    ($state:expr) => {
        test::init_service(
            App::new().app_data($state).service(
                web::scope("/api")
                    .wrap(JwtMiddleware)
                    .service(book_appointment)
                    .service(list_appointments)
                    .service(cancel_appointment)
                    .service(complete_appointment)
                    .service(session_token)
                    .service(create_payment)
                    .service(create_review)
                    .service(upsert_profile),
            ),
        )
        .await
    };
}

#[actix_web::test]
async fn booking_prices_the_session_from_the_hourly_rate() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let client_id = support::seed_user(pool, "client@test.local", "client").await;
    let therapist_id = support::seed_user(pool, "therapist@test.local", "therapist").await;
    support::seed_therapist_profile(pool, therapist_id, true).await; // 12000/hour

    let state = web::Data::new(support::build_state(test_db.pool.clone()));
    let app = build_app!(state);
    let auth = ("Authorization", format!("Bearer {}", support::make_jwt(client_id)));

    let req = test::TestRequest::post()
        .uri("/api/appointments")
        .insert_header(auth.clone())
        .set_json(json!({
            "therapist_id": therapist_id,
            "scheduled_at": Utc::now() + Duration::days(3),
            "duration_minutes": 90,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let out: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(out["status"], json!("pending"));
    assert_eq!(out["payment_status"], json!("unpaid"));
    assert_eq!(out["amount_cents"], json!(18_000)); // 90 min of a 12000-cent hour
    assert!(out["channel_name"].as_str().unwrap().starts_with("session-"));

    let req = test::TestRequest::get()
        .uri("/api/appointments")
        .insert_header(auth)
        .to_request();
    let resp = test::call_service(&app, req).await;
    let mine: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn unverified_therapists_cannot_be_booked() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let client_id = support::seed_user(pool, "client@test.local", "client").await;
    let therapist_id = support::seed_user(pool, "therapist@test.local", "therapist").await;
    support::seed_therapist_profile(pool, therapist_id, false).await;

    let state = web::Data::new(support::build_state(test_db.pool.clone()));
    let app = build_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/appointments")
        .insert_header(("Authorization", format!("Bearer {}", support::make_jwt(client_id))))
        .set_json(json!({
            "therapist_id": therapist_id,
            "scheduled_at": Utc::now() + Duration::days(3),
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn booking_respects_the_platform_kill_switch() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let client_id = support::seed_user(pool, "client@test.local", "client").await;
    let therapist_id = support::seed_user(pool, "therapist@test.local", "therapist").await;
    support::seed_therapist_profile(pool, therapist_id, true).await;

    sqlx::query("UPDATE platform_settings SET bookings_enabled = false WHERE id = 1")
        .execute(pool)
        .await
        .expect("disable bookings");

    let state = web::Data::new(support::build_state(test_db.pool.clone()));
    let app = build_app!(state);

    let req = test::TestRequest::post()
        .uri("/api/appointments")
        .insert_header(("Authorization", format!("Bearer {}", support::make_jwt(client_id))))
        .set_json(json!({
            "therapist_id": therapist_id,
            "scheduled_at": Utc::now() + Duration::days(3),
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn pay_creates_a_pending_payment_with_client_secret() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let client_id = support::seed_user(pool, "client@test.local", "client").await;
    let therapist_id = support::seed_user(pool, "therapist@test.local", "therapist").await;
    support::seed_therapist_profile(pool, therapist_id, true).await;

    let state = web::Data::new(support::build_state(test_db.pool.clone()));
    let app = build_app!(state);
    let auth = ("Authorization", format!("Bearer {}", support::make_jwt(client_id)));

    let req = test::TestRequest::post()
        .uri("/api/appointments")
        .insert_header(auth.clone())
        .set_json(json!({
            "therapist_id": therapist_id,
            "scheduled_at": Utc::now() + Duration::days(3),
        }))
        .to_request();
    let out: serde_json::Value = test::read_body_json(test::call_service(&app, req).await).await;
    let appointment_id = out["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/appointments/{appointment_id}/pay"))
        .insert_header(auth.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let out: serde_json::Value = test::read_body_json(resp).await;
    assert!(out["client_secret"].as_str().is_some());
    assert_eq!(out["amount_cents"], json!(12_000));

    let status: String = sqlx::query("SELECT status FROM payments WHERE appointment_id = $1")
        .bind(appointment_id as i32)
        .fetch_one(pool)
        .await
        .expect("payment")
        .get("status");
    assert_eq!(status, "pending");

    // Someone else's appointment is off limits.
    let stranger = support::seed_user(pool, "stranger@test.local", "client").await;
    let req = test::TestRequest::post()
        .uri(&format!("/api/appointments/{appointment_id}/pay"))
        .insert_header(("Authorization", format!("Bearer {}", support::make_jwt(stranger))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
async fn session_token_requires_a_confirmed_participant() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let client_id = support::seed_user(pool, "client@test.local", "client").await;
    let therapist_id = support::seed_user(pool, "therapist@test.local", "therapist").await;
    support::seed_therapist_profile(pool, therapist_id, true).await;

    let appointment_id: i32 = sqlx::query(
        r#"INSERT INTO appointments
               (client_id, therapist_id, scheduled_at, duration_minutes, status,
                payment_status, amount_cents, currency, channel_name)
           VALUES ($1, $2, $3, 60, 'confirmed', 'paid', 12000, 'usd', 'session-tok-test')
           RETURNING id"#,
    )
    .bind(client_id)
    .bind(therapist_id)
    .bind(Utc::now() + Duration::hours(1))
    .fetch_one(pool)
    .await
    .expect("insert appointment")
    .get("id");

    let state = web::Data::new(support::build_state(test_db.pool.clone()));
    let app = build_app!(state);

    for user in [client_id, therapist_id] {
        let req = test::TestRequest::get()
            .uri(&format!("/api/appointments/{appointment_id}/session-token"))
            .insert_header(("Authorization", format!("Bearer {}", support::make_jwt(user))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let out: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(out["channel_name"], json!("session-tok-test"));
        assert_eq!(out["uid"], json!(user));
        assert!(out["token"].as_str().unwrap().starts_with("007"));
    }

    let stranger = support::seed_user(pool, "stranger@test.local", "client").await;
    let req = test::TestRequest::get()
        .uri(&format!("/api/appointments/{appointment_id}/session-token"))
        .insert_header(("Authorization", format!("Bearer {}", support::make_jwt(stranger))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}

// Ownership is not enough: a suspended account cannot act on its own
// appointments either.
#[actix_web::test]
async fn suspended_accounts_cannot_act_on_their_appointments() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let client_id = support::seed_user(pool, "client@test.local", "client").await;
    let therapist_id = support::seed_user(pool, "therapist@test.local", "therapist").await;
    support::seed_therapist_profile(pool, therapist_id, true).await;

    let appointment_id: i32 = sqlx::query(
        r#"INSERT INTO appointments
               (client_id, therapist_id, scheduled_at, duration_minutes, status,
                payment_status, amount_cents, currency, channel_name)
           VALUES ($1, $2, $3, 60, 'confirmed', 'unpaid', 12000, 'usd', 'session-susp-test')
           RETURNING id"#,
    )
    .bind(client_id)
    .bind(therapist_id)
    .bind(Utc::now() + Duration::hours(1))
    .fetch_one(pool)
    .await
    .expect("insert appointment")
    .get("id");

    sqlx::query("UPDATE users SET status = 'suspended' WHERE id = $1")
        .bind(client_id)
        .execute(pool)
        .await
        .expect("suspend client");

    let state = web::Data::new(support::build_state(test_db.pool.clone()));
    let app = build_app!(state);
    let auth = ("Authorization", format!("Bearer {}", support::make_jwt(client_id)));

    let req = test::TestRequest::post()
        .uri(&format!("/api/appointments/{appointment_id}/pay"))
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::get()
        .uri(&format!("/api/appointments/{appointment_id}/session-token"))
        .insert_header(auth.clone())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::post()
        .uri(&format!("/api/appointments/{appointment_id}/cancel"))
        .insert_header(auth)
        .set_json(json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    // Same for the other side: a suspended therapist cannot complete.
    sqlx::query("UPDATE users SET status = 'suspended' WHERE id = $1")
        .bind(therapist_id)
        .execute(pool)
        .await
        .expect("suspend therapist");

    let req = test::TestRequest::post()
        .uri(&format!("/api/appointments/{appointment_id}/complete"))
        .insert_header(("Authorization", format!("Bearer {}", support::make_jwt(therapist_id))))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    // Nothing moved.
    let status: String = sqlx::query("SELECT status FROM appointments WHERE id = $1")
        .bind(appointment_id)
        .fetch_one(pool)
        .await
        .expect("appointment")
        .get("status");
    assert_eq!(status, "confirmed");
}

#[actix_web::test]
async fn profile_update_sends_the_therapist_back_through_moderation() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let therapist_id = support::seed_user(pool, "therapist@test.local", "therapist").await;
    support::seed_therapist_profile(pool, therapist_id, true).await;
    sqlx::query("UPDATE therapist_profiles SET verified_at = NOW() WHERE user_id = $1")
        .bind(therapist_id)
        .execute(pool)
        .await
        .expect("set verified_at");

    let state = web::Data::new(support::build_state(test_db.pool.clone()));
    let app = build_app!(state);

    let req = test::TestRequest::put()
        .uri("/api/therapist/profile")
        .insert_header(("Authorization", format!("Bearer {}", support::make_jwt(therapist_id))))
        .set_json(json!({
            "license_number": "LIC-1234",
            "hourly_rate_cents": 15000,
            "bio": "updated bio",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let out: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(out["is_verified"], json!(false));
    assert_eq!(out["hourly_rate_cents"], json!(15_000));

    let row = sqlx::query(
        "SELECT is_verified, verified_at FROM therapist_profiles WHERE user_id = $1",
    )
    .bind(therapist_id)
    .fetch_one(pool)
    .await
    .expect("profile row");
    assert!(!row.get::<bool, _>("is_verified"));
    assert!(row
        .get::<Option<chrono::DateTime<Utc>>, _>("verified_at")
        .is_none());
}

#[actix_web::test]
async fn completion_and_review_flow() {
    let test_db = support::init_test_db().await;
    let pool = &test_db.pool;

    let client_id = support::seed_user(pool, "client@test.local", "client").await;
    let therapist_id = support::seed_user(pool, "therapist@test.local", "therapist").await;
    support::seed_therapist_profile(pool, therapist_id, true).await;

    let appointment_id: i32 = sqlx::query(
        r#"INSERT INTO appointments
               (client_id, therapist_id, scheduled_at, duration_minutes, status,
                payment_status, amount_cents, currency, channel_name)
           VALUES ($1, $2, NOW() - INTERVAL '1 hour', 60, 'confirmed', 'paid', 12000, 'usd',
                   'session-complete-test')
           RETURNING id"#,
    )
    .bind(client_id)
    .bind(therapist_id)
    .fetch_one(pool)
    .await
    .expect("insert appointment")
    .get("id");

    let state = web::Data::new(support::build_state(test_db.pool.clone()));
    let app = build_app!(state);

    // The client cannot complete it.
    let req = test::TestRequest::post()
        .uri(&format!("/api/appointments/{appointment_id}/complete"))
        .insert_header(("Authorization", format!("Bearer {}", support::make_jwt(client_id))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::post()
        .uri(&format!("/api/appointments/{appointment_id}/complete"))
        .insert_header(("Authorization", format!("Bearer {}", support::make_jwt(therapist_id))))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let status: String = sqlx::query("SELECT status FROM appointments WHERE id = $1")
        .bind(appointment_id)
        .fetch_one(pool)
        .await
        .expect("appointment")
        .get("status");
    assert_eq!(status, "completed");

    // Client reviews the completed appointment; a second review is refused.
    let auth = ("Authorization", format!("Bearer {}", support::make_jwt(client_id)));
    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .insert_header(auth.clone())
        .set_json(json!({"appointment_id": appointment_id, "rating": 5, "comment": "great"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let out: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(out["status"], json!("pending"));

    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .insert_header(auth)
        .set_json(json!({"appointment_id": appointment_id, "rating": 4}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

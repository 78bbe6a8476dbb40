// src/api/auth.rs

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{post, web, Error, HttpMessage, HttpResponse, Responder};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::task::{Context, Poll};
use utoipa::ToSchema;

use crate::{db, AppState};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i32,
    exp: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    /// "client" (default) or "therapist". Admin accounts are provisioned
    /// out of band, never through this route.
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: i32,
    pub role: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 400, description = "Duplicate email or invalid role")
    )
)]
#[post("/auth/register")]
pub async fn register(
    state: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> impl Responder {
    let role = payload.role.as_deref().unwrap_or("client");
    if role != "client" && role != "therapist" {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "role must be client or therapist"
        }));
    }

    if !payload.email.contains('@') || payload.password.len() < 8 {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "invalid email or password too short"
        }));
    }

    let password_hash = match hash(&payload.password, DEFAULT_COST) {
        Ok(h) => h,
        Err(e) => {
            log::error!("bcrypt hash error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let row = match sqlx::query(
        r#"INSERT INTO users (email, password_hash, display_name, role)
           VALUES ($1, $2, $3, $4)
           RETURNING id"#,
    )
    .bind(payload.email.trim())
    .bind(password_hash)
    .bind(payload.display_name.as_deref())
    .bind(role)
    .fetch_one(&state.pool)
    .await
    {
        Ok(r) => r,
        Err(e) => {
            log::warn!("register db error: {e}");
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "user already exists or invalid data"
            }));
        }
    };

    let user_id: i32 = row.get("id");

    let token = match generate_jwt(user_id) {
        Ok(t) => t,
        Err(e) => {
            log::error!("jwt encode error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    HttpResponse::Ok().json(AuthResponse {
        token,
        user_id,
        role: role.to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
#[post("/auth/login")]
pub async fn login(state: web::Data<AppState>, payload: web::Json<LoginRequest>) -> impl Responder {
    let row = match sqlx::query(r#"SELECT id, password_hash, role FROM users WHERE email = $1"#)
        .bind(payload.email.trim())
        .fetch_optional(&state.pool)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            log::error!("login db error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let Some(row) = row else {
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "invalid credentials"
        }));
    };

    let user_id: i32 = row.get("id");
    let password_hash: String = row.get("password_hash");
    let role: String = row.get("role");

    match verify(&payload.password, &password_hash) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "invalid credentials"
            }));
        }
        Err(e) => {
            log::error!("bcrypt verify error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let token = match generate_jwt(user_id) {
        Ok(t) => t,
        Err(e) => {
            log::error!("jwt encode error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    HttpResponse::Ok().json(AuthResponse {
        token,
        user_id,
        role,
    })
}

fn generate_jwt(user_id: i32) -> Result<String, String> {
    let secret = std::env::var("JWT_SECRET").map_err(|_| "JWT_SECRET not set".to_string())?;

    let expiration = Utc::now()
        .checked_add_signed(Duration::days(30))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| e.to_string())
}

/// Outcome of the per-request role read. The token only proves identity; the
/// role and account status come from the user row at request time.
pub enum Gate {
    Allowed,
    Forbidden(HttpResponse),
}

pub async fn require_role(pool: &PgPool, user_id: i32, role: &str) -> Gate {
    match db::get_user_gate(pool, user_id).await {
        Ok(Some((actual_role, status))) => {
            if status != "active" {
                return Gate::Forbidden(HttpResponse::Forbidden().json(serde_json::json!({
                    "error": "account suspended"
                })));
            }
            if actual_role != role {
                return Gate::Forbidden(HttpResponse::Forbidden().json(serde_json::json!({
                    "error": format!("{role} role required")
                })));
            }
            Gate::Allowed
        }
        Ok(None) => Gate::Forbidden(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "unknown user"
        }))),
        Err(e) => {
            log::error!("role lookup error: {e}");
            Gate::Forbidden(HttpResponse::InternalServerError().finish())
        }
    }
}

pub async fn require_admin(pool: &PgPool, user_id: i32) -> Gate {
    require_role(pool, user_id, "admin").await
}

/// Status-only gate for ownership-checked routes (pay, cancel, complete,
/// session tokens): any role may pass, but suspended accounts may not.
pub async fn require_active(pool: &PgPool, user_id: i32) -> Gate {
    match db::get_user_gate(pool, user_id).await {
        Ok(Some((_, status))) if status == "active" => Gate::Allowed,
        Ok(Some(_)) => Gate::Forbidden(HttpResponse::Forbidden().json(serde_json::json!({
            "error": "account suspended"
        }))),
        Ok(None) => Gate::Forbidden(HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "unknown user"
        }))),
        Err(e) => {
            log::error!("status lookup error: {e}");
            Gate::Forbidden(HttpResponse::InternalServerError().finish())
        }
    }
}

/// Middleware that:
/// - takes the JWT from `Authorization: Bearer <jwt>` or the `token` cookie
/// - validates it
/// - puts the `i32` user id into `req.extensions_mut()`
pub struct JwtMiddleware;

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtMiddlewareInner<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareInner { service }))
    }
}

pub struct JwtMiddlewareInner<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareInner<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let secret = match std::env::var("JWT_SECRET") {
            Ok(s) => s,
            Err(_) => {
                return Box::pin(async move {
                    Err(actix_web::error::ErrorInternalServerError(
                        "JWT secret not set",
                    ))
                })
            }
        };

        let header_token = req
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.to_string());

        let token = header_token.or_else(|| req.cookie("token").map(|c| c.value().to_string()));

        if let Some(token) = token {
            match decode::<Claims>(
                &token,
                &DecodingKey::from_secret(secret.as_ref()),
                &Validation::default(),
            ) {
                Ok(token_data) => {
                    req.extensions_mut().insert(token_data.claims.sub);
                    let fut = self.service.call(req);
                    return Box::pin(async move { fut.await });
                }
                Err(_) => {
                    return Box::pin(async move {
                        Err(actix_web::error::ErrorUnauthorized("Invalid token"))
                    })
                }
            }
        }

        Box::pin(async move {
            Err(actix_web::error::ErrorUnauthorized(
                "Missing or invalid Authorization header",
            ))
        })
    }
}

// src/api/stripe_client.rs
//
// Minimal client for the Stripe REST API (https://api.stripe.com).
// Auth: HTTP basic with the secret key, form-encoded bodies.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;

const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Webhook signatures older than this are rejected as replays.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug)]
pub enum StripeError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
    InvalidResponse(String),
}

impl fmt::Display for StripeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripeError::Http(e) => write!(f, "http error: {e}"),
            StripeError::Api { status, body } => {
                write!(f, "stripe api error status={status} body={body}")
            }
            StripeError::InvalidResponse(e) => write!(f, "invalid response: {e}"),
        }
    }
}

impl From<reqwest::Error> for StripeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundObject {
    pub id: String,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferObject {
    pub id: String,
}

async fn post_form<T: for<'de> Deserialize<'de>>(
    secret_key: &str,
    path: &str,
    form: &[(&str, String)],
) -> Result<T, StripeError> {
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{STRIPE_API_BASE}{path}"))
        .basic_auth(secret_key, None::<&str>)
        .form(form)
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(StripeError::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str::<T>(&body)
        .map_err(|e| StripeError::InvalidResponse(format!("{e}; body={body}")))
}

/// Creates a payment intent for an appointment. The appointment id rides
/// along in metadata so the webhook can be traced back in the dashboard.
pub async fn create_payment_intent(
    secret_key: &str,
    amount_cents: i64,
    currency: &str,
    appointment_id: i32,
) -> Result<PaymentIntent, StripeError> {
    post_form(
        secret_key,
        "/v1/payment_intents",
        &[
            ("amount", amount_cents.to_string()),
            ("currency", currency.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[appointment_id]", appointment_id.to_string()),
        ],
    )
    .await
}

pub async fn create_refund(
    secret_key: &str,
    payment_intent_id: &str,
    amount_cents: Option<i64>,
) -> Result<RefundObject, StripeError> {
    let mut form = vec![("payment_intent", payment_intent_id.to_string())];
    if let Some(amount) = amount_cents {
        form.push(("amount", amount.to_string()));
    }

    post_form(secret_key, "/v1/refunds", &form).await
}

/// Moves a therapist's net share to their connected account.
pub async fn create_transfer(
    secret_key: &str,
    amount_cents: i64,
    currency: &str,
    destination_account: &str,
    transfer_group: &str,
) -> Result<TransferObject, StripeError> {
    post_form(
        secret_key,
        "/v1/transfers",
        &[
            ("amount", amount_cents.to_string()),
            ("currency", currency.to_string()),
            ("destination", destination_account.to_string()),
            ("transfer_group", transfer_group.to_string()),
        ],
    )
    .await
}

/// Verifies a `Stripe-Signature` header (`t=<unix>,v1=<hex hmac>`) against the
/// raw request body. The signed payload is `"{t}.{body}"`; signatures outside
/// the tolerance window are rejected even when the HMAC matches.
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    now_unix: i64,
) -> bool {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<String> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse().ok(),
            Some(("v1", v)) => candidates.push(v.to_string()),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    if candidates.is_empty() {
        return false;
    }
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return false;
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    candidates.iter().any(|c| {
        // constant-time enough for hex strings of equal length
        c.len() == expected.len()
            && c.bytes()
                .zip(expected.bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    })
}

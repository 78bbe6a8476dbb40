pub mod admin;
pub mod appointments;
pub mod auth;
pub mod mailer;
pub mod payments;
pub mod payouts;
pub mod reviews;
pub mod stripe_client;
pub mod therapists;
pub mod webhooks;

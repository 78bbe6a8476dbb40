use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::appointments::book_appointment,
        crate::api::payments::create_payment,
        crate::api::webhooks::stripe_webhook,
        crate::api::payouts::run_payout_sweep,
        crate::api::admin::create_refund
    ),
    components(
        schemas(
            crate::api::auth::RegisterRequest,
            crate::api::auth::LoginRequest,
            crate::api::auth::AuthResponse,
            crate::api::appointments::BookAppointmentRequest,
            crate::api::appointments::CancelRequest,
            crate::api::therapists::UpsertProfileRequest,
            crate::api::reviews::CreateReviewRequest,
            crate::api::admin::VerifyRequest,
            crate::api::admin::FeatureRequest,
            crate::api::admin::SuspendRequest,
            crate::api::admin::CreateRefundRequest,
            crate::api::admin::UpdateSettingsRequest,
            crate::api::webhooks::StripeEvent,
            crate::api::webhooks::StripeEventData,
            crate::api::webhooks::StripeEventObject,
            crate::models::User,
            crate::models::TherapistProfile,
            crate::models::Appointment,
            crate::models::Payment,
            crate::models::Payout,
            crate::models::Refund,
            crate::models::Review,
            crate::models::PlatformSettings
        )
    ),
    tags(
        (name = "auth", description = "Authentication"),
        (name = "appointments", description = "Booking and session lifecycle"),
        (name = "payments", description = "Payment intents"),
        (name = "webhooks", description = "Payment-processor callbacks"),
        (name = "payouts", description = "Cron-triggered payout sweep"),
        (name = "admin", description = "Moderation and money movement")
    )
)]
pub struct ApiDoc;

// src/billing.rs
//
// Money math for the marketplace. Everything is integer cents; the split is
// computed so that fee + net always reconstructs the gross amount exactly.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub gross_cents: i64,
    pub platform_fee_cents: i64,
    pub net_cents: i64,
}

/// Splits a gross payment into platform fee and therapist net.
/// The fee is rounded half-up to the nearest cent and the net is derived by
/// subtraction, so the invariant `fee + net == gross` holds for every input.
pub fn fee_split(gross_cents: i64, commission_rate: f64) -> FeeSplit {
    let rate = commission_rate.clamp(0.0, 1.0);
    let fee = (gross_cents as f64 * rate).round() as i64;
    let fee = fee.clamp(0, gross_cents);

    FeeSplit {
        gross_cents,
        platform_fee_cents: fee,
        net_cents: gross_cents - fee,
    }
}

/// Price of a session: the therapist hourly rate pro-rated by duration,
/// rounded to the nearest cent.
pub fn session_amount_cents(hourly_rate_cents: i64, duration_minutes: i32) -> i64 {
    (hourly_rate_cents as f64 * duration_minutes as f64 / 60.0).round() as i64
}

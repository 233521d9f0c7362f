use chrono::{DateTime, Utc};

/// Total for a rental: every hourly rate (facility and each reserved unit) times the
/// booked duration, rounded to cents.
pub fn quote_total_price(
    facility_price_per_hour: f64,
    equipment_prices_per_hour: &[f64],
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> f64 {
    let hours = (ends_at - starts_at).num_minutes() as f64 / 60.0;
    let hourly: f64 = facility_price_per_hour + equipment_prices_per_hour.iter().sum::<f64>();
    round_to_cents(hourly * hours)
}

pub fn round_to_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Amount in the processor's minor currency unit.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

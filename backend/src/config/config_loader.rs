use anyhow::{Context, Result};
use std::str::FromStr;

use super::config_model::{Auth, BackendServer, Booking, Database, DotEnvyConfig, Stripe};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<DotEnvyConfig> {
    let required = |key: &str| lookup(key).with_context(|| format!("{key} is invalid"));

    let backend_server = BackendServer {
        port: parse(&required("SERVER_PORT_BACKEND")?, "SERVER_PORT_BACKEND")?,
        body_limit: parse(&required("SERVER_BODY_LIMIT")?, "SERVER_BODY_LIMIT")?,
        timeout: parse(&required("SERVER_TIMEOUT")?, "SERVER_TIMEOUT")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: optional(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
    };

    let auth = Auth {
        jwt_secret: required("JWT_SECRET")?,
    };

    let stripe = Stripe {
        secret_key: required("STRIPE_SECRET_KEY")?,
        webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
        publishable_key: required("STRIPE_PUBLISHABLE_KEY")?,
        timeout_secs: optional(&lookup, "STRIPE_TIMEOUT_SECS", 10)?,
        webhook_tolerance_secs: optional(&lookup, "STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?,
    };

    let booking = Booking {
        utc_offset_minutes: optional(&lookup, "BOOKING_UTC_OFFSET_MINUTES", 0)?,
        completion_sweep_secs: optional(&lookup, "RENTAL_COMPLETION_SWEEP_SECS", 300)?,
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        auth,
        stripe,
        booking,
    })
}

fn parse<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} is invalid"))
}

fn optional<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => parse(&raw, key),
        None => Ok(default),
    }
}

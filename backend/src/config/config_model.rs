#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub auth: Auth,
    pub stripe: Stripe,
    pub booking: Booking,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct Auth {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct Stripe {
    pub secret_key: String,
    pub webhook_secret: String,
    pub publishable_key: String,
    pub timeout_secs: u64,
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone)]
pub struct Booking {
    /// Offset, in minutes east of UTC, in which facility operating hours are expressed.
    pub utc_offset_minutes: i32,
    pub completion_sweep_secs: u64,
}

use crate::{
    auth::AuthConfig,
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
    usecases::booking_locks::BookingLocks,
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use chrono::FixedOffset;
use courtbook::{
    domain::value_objects::booking_rules::BookingPolicy,
    infra::db::postgres::postgres_connection::PgPoolSquad,
    payments::stripe_client::StripeClient,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

pub fn booking_policy(config: &DotEnvyConfig) -> Result<BookingPolicy> {
    let minutes = config.booking.utc_offset_minutes;
    let local_offset = FixedOffset::east_opt(minutes * 60)
        .with_context(|| format!("BOOKING_UTC_OFFSET_MINUTES {minutes} is out of range"))?;

    Ok(BookingPolicy::default().with_local_offset(local_offset))
}

pub async fn start(
    config: Arc<DotEnvyConfig>,
    db_pool: Arc<PgPoolSquad>,
    booking_locks: Arc<BookingLocks>,
) -> Result<()> {
    let stripe_client = Arc::new(StripeClient::new(
        config.stripe.secret_key.clone(),
        config.stripe.webhook_secret.clone(),
        Duration::from_secs(config.stripe.timeout_secs),
        config.stripe.webhook_tolerance_secs,
    )?);
    let auth_config = Arc::new(AuthConfig {
        jwt_secret: config.auth.jwt_secret.clone(),
    });

    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest(
            "/api/v1/rentals",
            routers::rentals::routes(
                Arc::clone(&db_pool),
                booking_locks,
                booking_policy(&config)?,
            ),
        )
        .nest(
            "/api/v1/payments",
            routers::payments::routes(
                Arc::clone(&db_pool),
                stripe_client,
                config.stripe.publishable_key.clone(),
            ),
        )
        .route("/api/v1/health-check", get(default_routers::health_check))
        .layer(Extension(auth_config))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.backend_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.backend_server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::PUT,
                    Method::DELETE,
                ])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.backend_server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}

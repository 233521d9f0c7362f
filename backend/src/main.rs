use anyhow::Result;
use backend::{
    axum_http::http_serve,
    config::config_loader,
    services::completion_sweep,
    usecases::{booking_locks::BookingLocks, rentals::RentalUseCase},
};
use courtbook::infra::db::{
    postgres::postgres_connection,
    repositories::{catalog::CatalogPostgres, rentals::RentalPostgres},
};
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Backend exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    courtbook::observability::init_observability("backend")?;

    let dotenvy_env = Arc::new(config_loader::load()?);
    info!("ENV has been loaded");

    let postgres_pool = Arc::new(postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        dotenvy_env.database.max_connections,
    )?);
    info!("Postgres connection has been established");

    let booking_locks = Arc::new(BookingLocks::new());
    let sweep_usecase = Arc::new(RentalUseCase::new(
        Arc::new(RentalPostgres::new(Arc::clone(&postgres_pool))),
        Arc::new(CatalogPostgres::new(Arc::clone(&postgres_pool))),
        Arc::clone(&booking_locks),
        http_serve::booking_policy(&dotenvy_env)?,
    ));
    let sweep = tokio::spawn(completion_sweep::run_completion_sweep(
        sweep_usecase,
        Duration::from_secs(dotenvy_env.booking.completion_sweep_secs.max(1)),
    ));

    let server = http_serve::start(dotenvy_env, postgres_pool, booking_locks);

    tokio::select! {
        result = server => result?,
        result = sweep => result??,
    };

    Ok(())
}

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use courtbook::domain::repositories::{catalog::CatalogRepository, rentals::RentalRepository};
use tracing::{debug, error, info};

use crate::usecases::rentals::RentalUseCase;

/// Periodically marks confirmed rentals whose slot has ended as completed.
pub async fn run_completion_sweep<R, C>(
    usecase: Arc<RentalUseCase<R, C>>,
    every: Duration,
) -> Result<()>
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    info!(every_secs = every.as_secs(), "completion sweep: started");
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        sweep_once(&usecase).await;
    }
}

pub async fn sweep_once<R, C>(usecase: &RentalUseCase<R, C>) -> usize
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    match usecase.complete_elapsed().await {
        Ok(0) => {
            debug!("completion sweep: nothing to complete");
            0
        }
        Ok(completed) => {
            info!(completed, "completion sweep: rentals completed");
            completed
        }
        Err(err) => {
            error!(error = %err, "completion sweep: failed");
            0
        }
    }
}

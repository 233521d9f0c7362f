use std::sync::Arc;

use chrono::{DateTime, Utc};
use courtbook::domain::{
    entities::{
        equipment::EquipmentEntity,
        rentals::{InsertRentalEntity, RentalEntity, RescheduleRentalEntity},
    },
    repositories::{catalog::CatalogRepository, rentals::RentalRepository},
    value_objects::{
        booking_rules::{BookingPolicy, RuleViolation, SlotCandidate},
        enums::{rental_payment_statuses::RentalPaymentStatus, rental_statuses::RentalStatus},
        inventory::{self, CancellationOutcome, OutOfStock, ReservationOutcome, StockCheckError},
        pricing,
        rentals::{RentalDto, RentalRequestModel, RentalStatusDto},
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::booking_locks::BookingLocks;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RentalError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },
    #[error(transparent)]
    Validation(#[from] RuleViolation),
    #[error(transparent)]
    OutOfStock(#[from] OutOfStock),
    #[error("rental is already cancelled")]
    AlreadyCancelled,
    #[error("rental has already taken place")]
    AlreadyPassed,
    #[error("rental price is fixed once payment has started")]
    PriceLocked,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RentalError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            RentalError::NotFound { .. } => StatusCode::NOT_FOUND,
            RentalError::Validation(_) | RentalError::OutOfStock(_) => StatusCode::BAD_REQUEST,
            RentalError::AlreadyCancelled
            | RentalError::AlreadyPassed
            | RentalError::PriceLocked => StatusCode::CONFLICT,
            RentalError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, RentalError>;

pub struct RentalUseCase<R, C>
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    rental_repo: Arc<R>,
    catalog_repo: Arc<C>,
    booking_locks: Arc<BookingLocks>,
    policy: BookingPolicy,
    clock: Clock,
}

impl<R, C> RentalUseCase<R, C>
where
    R: RentalRepository + Send + Sync + 'static,
    C: CatalogRepository + Send + Sync + 'static,
{
    pub fn new(
        rental_repo: Arc<R>,
        catalog_repo: Arc<C>,
        booking_locks: Arc<BookingLocks>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            rental_repo,
            catalog_repo,
            booking_locks,
            policy,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn create(
        &self,
        renter_id: Uuid,
        request: RentalRequestModel,
    ) -> UseCaseResult<RentalDto> {
        let now = (self.clock)();
        let facility_id = request.facility_id;
        info!(
            %renter_id,
            %facility_id,
            starts_at = %request.starts_at,
            ends_at = %request.ends_at,
            "rentals: creating rental"
        );

        self.policy
            .validate_timing(now, request.starts_at, request.ends_at)?;

        let facility = self
            .catalog_repo
            .find_facility(facility_id)
            .await
            .map_err(|err| {
                error!(%facility_id, db_error = ?err, "rentals: failed to load facility");
                RentalError::Internal(err)
            })?
            .ok_or(RentalError::NotFound {
                entity: "facility",
                id: facility_id,
            })?;

        let renter_exists = self
            .catalog_repo
            .renter_exists(renter_id)
            .await
            .map_err(|err| {
                error!(%renter_id, db_error = ?err, "rentals: failed to look up renter");
                RentalError::Internal(err)
            })?;
        if !renter_exists {
            return Err(RentalError::NotFound {
                entity: "renter",
                id: renter_id,
            });
        }

        let equipment_ids = request.equipment_ids.unwrap_or_default();
        let equipment = self.load_available_equipment(&equipment_ids).await?;
        let total_price = pricing::quote_total_price(
            facility.price_per_hour,
            &unit_prices(&equipment_ids, &equipment),
            request.starts_at,
            request.ends_at,
        );

        let candidate = SlotCandidate {
            starts_at: request.starts_at,
            ends_at: request.ends_at,
            replacing: None,
        };

        let _facility_guard = self.booking_locks.acquire(facility_id).await;

        let existing = self
            .rental_repo
            .find_overlapping(facility_id, request.starts_at, request.ends_at)
            .await
            .map_err(|err| {
                error!(%facility_id, db_error = ?err, "rentals: failed to load overlapping rentals");
                RentalError::Internal(err)
            })?;

        self.policy
            .validate(now, &candidate, facility.operating_hours(), &existing)?;

        let outcome = self
            .rental_repo
            .insert_reserving_equipment(InsertRentalEntity {
                renter_id,
                facility_id,
                equipment_ids,
                starts_at: request.starts_at,
                ends_at: request.ends_at,
                status: RentalStatus::Confirmed.to_string(),
                total_price: Some(total_price),
                payment_status: RentalPaymentStatus::Unpaid.to_string(),
            })
            .await
            .map_err(|err| {
                error!(%renter_id, %facility_id, db_error = ?err, "rentals: failed to persist rental");
                RentalError::Internal(err)
            })?;

        let rental = settle_outcome(outcome, &equipment)?;
        info!(
            rental_id = %rental.id,
            %renter_id,
            %facility_id,
            total_price,
            "rentals: rental confirmed"
        );
        Ok(rental.into())
    }

    pub async fn update(
        &self,
        renter_id: Uuid,
        rental_id: Uuid,
        request: RentalRequestModel,
    ) -> UseCaseResult<RentalDto> {
        let now = (self.clock)();
        info!(
            %rental_id,
            facility_id = %request.facility_id,
            starts_at = %request.starts_at,
            ends_at = %request.ends_at,
            "rentals: updating rental"
        );

        // Held from the read to the write so the decision uses the stored rental.
        let _rental_guard = self.booking_locks.acquire(rental_id).await;

        let current = self.find_owned(renter_id, rental_id).await?;
        match current.rental_status() {
            Some(RentalStatus::Confirmed) => {}
            status => return Err(not_confirmed(status)),
        }

        self.policy
            .validate_timing(now, request.starts_at, request.ends_at)?;

        let facility_id = request.facility_id;
        let facility = self
            .catalog_repo
            .find_facility(facility_id)
            .await
            .map_err(|err| {
                error!(%facility_id, db_error = ?err, "rentals: failed to load facility");
                RentalError::Internal(err)
            })?
            .ok_or(RentalError::NotFound {
                entity: "facility",
                id: facility_id,
            })?;

        // Omitted equipment keeps the current reservation.
        let requested_ids = request
            .equipment_ids
            .clone()
            .unwrap_or_else(|| current.equipment_ids.clone());
        let swap_equipment = !inventory::same_equipment(&current.equipment_ids, &requested_ids);

        let equipment = if swap_equipment {
            self.load_available_equipment(&requested_ids).await?
        } else {
            self.load_equipment(&requested_ids).await?
        };
        let total_price = pricing::quote_total_price(
            facility.price_per_hour,
            &unit_prices(&requested_ids, &equipment),
            request.starts_at,
            request.ends_at,
        );
        if !current.accepts_price(Some(total_price)) {
            return Err(RentalError::PriceLocked);
        }

        let candidate = SlotCandidate {
            starts_at: request.starts_at,
            ends_at: request.ends_at,
            replacing: Some(rental_id),
        };

        let _facility_guard = self.booking_locks.acquire(facility_id).await;

        let existing = self
            .rental_repo
            .find_overlapping(facility_id, request.starts_at, request.ends_at)
            .await
            .map_err(|err| {
                error!(%facility_id, db_error = ?err, "rentals: failed to load overlapping rentals");
                RentalError::Internal(err)
            })?;

        self.policy
            .validate(now, &candidate, facility.operating_hours(), &existing)?;

        // Storage compares the requested list against the row it locks.
        let outcome = self
            .rental_repo
            .reschedule(
                rental_id,
                RescheduleRentalEntity {
                    facility_id,
                    starts_at: request.starts_at,
                    ends_at: request.ends_at,
                    total_price: Some(total_price),
                    equipment_ids: request.equipment_ids,
                    updated_at: now,
                },
            )
            .await
            .map_err(|err| {
                error!(%rental_id, db_error = ?err, "rentals: failed to persist update");
                RentalError::Internal(err)
            })?;

        let rental = settle_outcome(outcome, &equipment)?;
        info!(
            %rental_id,
            %facility_id,
            equipment_swapped = swap_equipment,
            total_price,
            "rentals: rental updated"
        );
        Ok(rental.into())
    }

    pub async fn cancel(&self, renter_id: Uuid, rental_id: Uuid) -> UseCaseResult<RentalDto> {
        let now = (self.clock)();
        info!(%rental_id, "rentals: cancelling rental");

        let _rental_guard = self.booking_locks.acquire(rental_id).await;

        let rental = self.find_owned(renter_id, rental_id).await?;
        match rental.rental_status() {
            Some(status) if status.can_transition_to(RentalStatus::Cancelled) => {}
            status => return Err(not_confirmed(status)),
        }
        if rental.ends_at <= now {
            return Err(RentalError::AlreadyPassed);
        }

        let outcome = self
            .rental_repo
            .cancel_restoring_equipment(rental_id)
            .await
            .map_err(|err| {
                error!(%rental_id, db_error = ?err, "rentals: failed to cancel rental");
                RentalError::Internal(err)
            })?;

        let cancelled = match outcome {
            CancellationOutcome::Cancelled(rental) => rental,
            CancellationOutcome::NotConfirmed(status) => {
                warn!(%rental_id, %status, "rentals: rental changed status before cancelling");
                return Err(not_confirmed(Some(status)));
            }
        };

        info!(
            %rental_id,
            restored_units = cancelled.equipment_ids.len(),
            "rentals: rental cancelled"
        );
        Ok(cancelled.into())
    }

    pub async fn get(&self, renter_id: Uuid, rental_id: Uuid) -> UseCaseResult<RentalDto> {
        let rental = self.find_owned(renter_id, rental_id).await?;
        Ok(rental.into())
    }

    pub async fn get_status(
        &self,
        renter_id: Uuid,
        rental_id: Uuid,
    ) -> UseCaseResult<RentalStatusDto> {
        let rental = self.find_owned(renter_id, rental_id).await?;
        Ok(RentalStatusDto::from(&rental))
    }

    pub async fn list_for_renter(&self, renter_id: Uuid) -> UseCaseResult<Vec<RentalDto>> {
        let rentals = self
            .rental_repo
            .list_by_renter(renter_id)
            .await
            .map_err(|err| {
                error!(%renter_id, db_error = ?err, "rentals: failed to list rentals");
                RentalError::Internal(err)
            })?;

        let rental_count = rentals.len();
        info!(%renter_id, rental_count, "rentals: rentals loaded");
        Ok(rentals.into_iter().map(RentalDto::from).collect())
    }

    /// Marks every confirmed rental whose interval has elapsed as completed.
    pub async fn complete_elapsed(&self) -> UseCaseResult<usize> {
        let now = (self.clock)();
        let completed = self
            .rental_repo
            .complete_elapsed(now)
            .await
            .map_err(|err| {
                error!(db_error = ?err, "rentals: failed to complete elapsed rentals");
                RentalError::Internal(err)
            })?;

        if completed > 0 {
            info!(completed, "rentals: elapsed rentals completed");
        }
        Ok(completed)
    }

    async fn find(&self, rental_id: Uuid) -> UseCaseResult<RentalEntity> {
        self.rental_repo
            .find_by_id(rental_id)
            .await
            .map_err(|err| {
                error!(%rental_id, db_error = ?err, "rentals: failed to load rental");
                RentalError::Internal(err)
            })?
            .ok_or(RentalError::NotFound {
                entity: "rental",
                id: rental_id,
            })
    }

    /// Rentals of other renters are reported as missing.
    async fn find_owned(&self, renter_id: Uuid, rental_id: Uuid) -> UseCaseResult<RentalEntity> {
        let rental = self.find(rental_id).await?;
        if rental.renter_id != renter_id {
            warn!(%rental_id, %renter_id, "rentals: rental belongs to another renter");
            return Err(RentalError::NotFound {
                entity: "rental",
                id: rental_id,
            });
        }
        Ok(rental)
    }

    async fn load_equipment(&self, equipment_ids: &[Uuid]) -> UseCaseResult<Vec<EquipmentEntity>> {
        if equipment_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.catalog_repo
            .find_equipment(equipment_ids.to_vec())
            .await
            .map_err(|err| {
                error!(db_error = ?err, "rentals: failed to load equipment");
                RentalError::Internal(err)
            })
    }

    async fn load_available_equipment(
        &self,
        equipment_ids: &[Uuid],
    ) -> UseCaseResult<Vec<EquipmentEntity>> {
        let equipment = self.load_equipment(equipment_ids).await?;

        inventory::check_stock(equipment_ids, &equipment).map_err(|err| match err {
            StockCheckError::UnknownEquipment(id) => RentalError::NotFound {
                entity: "equipment",
                id,
            },
            StockCheckError::OutOfStock(out_of_stock) => RentalError::OutOfStock(out_of_stock),
        })?;

        Ok(equipment)
    }
}

/// One hourly rate per listed id, so repeated ids are charged once per unit.
fn unit_prices(equipment_ids: &[Uuid], equipment: &[EquipmentEntity]) -> Vec<f64> {
    equipment_ids
        .iter()
        .filter_map(|id| equipment.iter().find(|item| item.id == *id))
        .map(|item| item.price_per_hour)
        .collect()
}

fn settle_outcome(
    outcome: ReservationOutcome,
    equipment: &[EquipmentEntity],
) -> UseCaseResult<RentalEntity> {
    match outcome {
        ReservationOutcome::Reserved(rental) => Ok(rental),
        ReservationOutcome::OutOfStock(equipment_id) => {
            let name = equipment
                .iter()
                .find(|item| item.id == equipment_id)
                .map(|item| item.name.clone())
                .unwrap_or_else(|| equipment_id.to_string());
            warn!(%equipment_id, %name, "rentals: stock ran out during reservation");
            Err(RentalError::OutOfStock(OutOfStock { equipment_id, name }))
        }
        ReservationOutcome::SlotTaken => {
            warn!("rentals: slot taken by a concurrent writer");
            Err(RentalError::Validation(RuleViolation::SlotConflict {
                conflicting_rental_id: None,
            }))
        }
        ReservationOutcome::NotConfirmed(status) => {
            warn!(%status, "rentals: rental changed status before the write");
            Err(not_confirmed(Some(status)))
        }
        ReservationOutcome::PriceLocked => {
            warn!("rentals: payment started before the write");
            Err(RentalError::PriceLocked)
        }
    }
}

/// The conflict reported for a rental that is no longer confirmed.
fn not_confirmed(status: Option<RentalStatus>) -> RentalError {
    match status {
        Some(RentalStatus::Completed) => RentalError::AlreadyPassed,
        Some(RentalStatus::Cancelled) => RentalError::AlreadyCancelled,
        Some(RentalStatus::Confirmed) | None => {
            RentalError::Internal(anyhow::anyhow!("rental status does not allow this change"))
        }
    }
}

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::rentals::{InsertRentalEntity, RentalEntity, RescheduleRentalEntity},
    value_objects::inventory::{CancellationOutcome, ReservationOutcome},
};

#[async_trait]
#[automock]
pub trait RentalRepository {
    async fn find_by_id(&self, rental_id: Uuid) -> Result<Option<RentalEntity>>;

    async fn list_by_renter(&self, renter_id: Uuid) -> Result<Vec<RentalEntity>>;

    /// Non-cancelled rentals of the facility whose interval intersects `[starts_at, ends_at)`.
    async fn find_overlapping(
        &self,
        facility_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Vec<RentalEntity>>;

    /// Inserts the rental and takes one unit per listed equipment id, all or nothing.
    async fn insert_reserving_equipment(
        &self,
        rental: InsertRentalEntity,
    ) -> Result<ReservationOutcome>;

    /// Applies the new schedule to the stored rental, read under a row lock. When the
    /// equipment list changes, the stored units go back to stock and the requested ones
    /// are taken in the same transaction. A price change on a rental whose payment has
    /// started is refused with `PriceLocked`.
    async fn reschedule(
        &self,
        rental_id: Uuid,
        changes: RescheduleRentalEntity,
    ) -> Result<ReservationOutcome>;

    /// Marks a confirmed rental cancelled and gives its stored equipment units back.
    async fn cancel_restoring_equipment(&self, rental_id: Uuid) -> Result<CancellationOutcome>;

    /// Moves confirmed rentals that ended at or before `now` to completed.
    async fn complete_elapsed(&self, now: DateTime<Utc>) -> Result<usize>;
}

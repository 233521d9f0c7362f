use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{
    RunQueryDsl, insert_into,
    prelude::*,
    result::Error as DieselError,
    update,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{equipment, rentals},
    },
};
use domain::{
    entities::rentals::{InsertRentalEntity, RentalEntity, RescheduleRentalEntity},
    repositories::rentals::RentalRepository,
    value_objects::{
        enums::{equipment_statuses::EquipmentStatus, rental_statuses::RentalStatus},
        inventory::{self, CancellationOutcome, ReservationOutcome},
    },
};

/// Name of the exclusion constraint that keeps live rentals of a facility disjoint.
pub const NO_OVERLAP_CONSTRAINT: &str = "rentals_no_overlap";

#[derive(Debug)]
enum ReservationTxError {
    OutOfStock(Uuid),
    SlotTaken,
    NotConfirmed(RentalStatus),
    PriceLocked,
    UnknownStatus(String),
    Database(DieselError),
}

impl From<DieselError> for ReservationTxError {
    fn from(error: DieselError) -> Self {
        match &error {
            DieselError::DatabaseError(_, info)
                if info.constraint_name() == Some(NO_OVERLAP_CONSTRAINT) =>
            {
                ReservationTxError::SlotTaken
            }
            _ => ReservationTxError::Database(error),
        }
    }
}

impl ReservationTxError {
    fn into_outcome(self) -> Result<ReservationOutcome> {
        match self {
            ReservationTxError::OutOfStock(equipment_id) => {
                Ok(ReservationOutcome::OutOfStock(equipment_id))
            }
            ReservationTxError::SlotTaken => Ok(ReservationOutcome::SlotTaken),
            ReservationTxError::NotConfirmed(status) => {
                Ok(ReservationOutcome::NotConfirmed(status))
            }
            ReservationTxError::PriceLocked => Ok(ReservationOutcome::PriceLocked),
            ReservationTxError::UnknownStatus(status) => {
                Err(anyhow!("rental has unknown status {status}"))
            }
            ReservationTxError::Database(error) => Err(error.into()),
        }
    }
}

/// Loads the rental with `FOR UPDATE` so concurrent writers of the same row queue up
/// behind this transaction.
fn lock_rental(
    conn: &mut PgConnection,
    rental_id: Uuid,
) -> Result<(RentalEntity, RentalStatus), ReservationTxError> {
    let stored = rentals::table
        .find(rental_id)
        .select(RentalEntity::as_select())
        .for_update()
        .first::<RentalEntity>(conn)?;

    match stored.rental_status() {
        Some(status) => Ok((stored, status)),
        None => Err(ReservationTxError::UnknownStatus(stored.status)),
    }
}

/// Takes one unit per id. Ids are processed in sorted order so concurrent reservations
/// lock equipment rows in the same sequence.
fn reserve_units(conn: &mut PgConnection, equipment_ids: &[Uuid]) -> Result<(), ReservationTxError> {
    let mut ids = equipment_ids.to_vec();
    ids.sort();

    for equipment_id in ids {
        let updated = update(
            equipment::table
                .filter(equipment::id.eq(equipment_id))
                .filter(equipment::quantity.ge(1))
                .filter(equipment::status.eq(EquipmentStatus::Available.to_string())),
        )
        .set((
            equipment::quantity.eq(equipment::quantity - 1),
            equipment::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;

        if updated == 0 {
            return Err(ReservationTxError::OutOfStock(equipment_id));
        }
    }
    Ok(())
}

fn restore_units(conn: &mut PgConnection, equipment_ids: &[Uuid]) -> Result<(), DieselError> {
    let mut ids = equipment_ids.to_vec();
    ids.sort();

    for equipment_id in ids {
        update(equipment::table.filter(equipment::id.eq(equipment_id)))
            .set((
                equipment::quantity.eq(equipment::quantity + 1),
                equipment::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
    }
    Ok(())
}

pub struct RentalPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl RentalPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl RentalRepository for RentalPostgres {
    async fn find_by_id(&self, rental_id: Uuid) -> Result<Option<RentalEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rental = rentals::table
            .find(rental_id)
            .select(RentalEntity::as_select())
            .first::<RentalEntity>(&mut conn)
            .optional()?;

        Ok(rental)
    }

    async fn list_by_renter(&self, renter_id: Uuid) -> Result<Vec<RentalEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = rentals::table
            .filter(rentals::renter_id.eq(renter_id))
            .order(rentals::created_at.desc())
            .select(RentalEntity::as_select())
            .load::<RentalEntity>(&mut conn)?;

        Ok(results)
    }

    async fn find_overlapping(
        &self,
        facility_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Vec<RentalEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = rentals::table
            .filter(rentals::facility_id.eq(facility_id))
            .filter(rentals::status.ne(RentalStatus::Cancelled.to_string()))
            .filter(rentals::starts_at.lt(ends_at))
            .filter(rentals::ends_at.gt(starts_at))
            .select(RentalEntity::as_select())
            .load::<RentalEntity>(&mut conn)?;

        Ok(results)
    }

    async fn insert_reserving_equipment(
        &self,
        rental: InsertRentalEntity,
    ) -> Result<ReservationOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = conn.transaction::<RentalEntity, ReservationTxError, _>(|conn| {
            reserve_units(conn, &rental.equipment_ids)?;

            let inserted = insert_into(rentals::table)
                .values(&rental)
                .returning(RentalEntity::as_returning())
                .get_result::<RentalEntity>(conn)?;

            Ok(inserted)
        });

        match result {
            Ok(inserted) => Ok(ReservationOutcome::Reserved(inserted)),
            Err(error) => error.into_outcome(),
        }
    }

    async fn reschedule(
        &self,
        rental_id: Uuid,
        changes: RescheduleRentalEntity,
    ) -> Result<ReservationOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = conn.transaction::<RentalEntity, ReservationTxError, _>(|conn| {
            let (stored, status) = lock_rental(conn, rental_id)?;
            if status != RentalStatus::Confirmed {
                return Err(ReservationTxError::NotConfirmed(status));
            }
            if !stored.accepts_price(changes.total_price) {
                return Err(ReservationTxError::PriceLocked);
            }

            if let Some(requested) = &changes.equipment_ids {
                if !inventory::same_equipment(&stored.equipment_ids, requested) {
                    restore_units(conn, &stored.equipment_ids)?;
                    reserve_units(conn, requested)?;
                }
            }

            let updated = update(rentals::table.filter(rentals::id.eq(rental_id)))
                .set(&changes)
                .returning(RentalEntity::as_returning())
                .get_result::<RentalEntity>(conn)?;

            Ok(updated)
        });

        match result {
            Ok(updated) => Ok(ReservationOutcome::Reserved(updated)),
            Err(error) => error.into_outcome(),
        }
    }

    async fn cancel_restoring_equipment(&self, rental_id: Uuid) -> Result<CancellationOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = conn.transaction::<RentalEntity, ReservationTxError, _>(|conn| {
            let (stored, status) = lock_rental(conn, rental_id)?;
            if !status.can_transition_to(RentalStatus::Cancelled) {
                return Err(ReservationTxError::NotConfirmed(status));
            }

            let cancelled = update(rentals::table.filter(rentals::id.eq(rental_id)))
                .set((
                    rentals::status.eq(RentalStatus::Cancelled.to_string()),
                    rentals::updated_at.eq(Utc::now()),
                ))
                .returning(RentalEntity::as_returning())
                .get_result::<RentalEntity>(conn)?;

            restore_units(conn, &stored.equipment_ids)?;
            Ok(cancelled)
        });

        match result {
            Ok(cancelled) => Ok(CancellationOutcome::Cancelled(cancelled)),
            Err(ReservationTxError::NotConfirmed(status)) => {
                Ok(CancellationOutcome::NotConfirmed(status))
            }
            Err(ReservationTxError::UnknownStatus(status)) => {
                Err(anyhow!("rental has unknown status {status}"))
            }
            Err(ReservationTxError::Database(error)) => Err(error.into()),
            Err(other) => Err(anyhow!("unexpected cancellation failure: {other:?}")),
        }
    }

    async fn complete_elapsed(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let completed = update(
            rentals::table
                .filter(rentals::status.eq(RentalStatus::Confirmed.to_string()))
                .filter(rentals::ends_at.le(now)),
        )
        .set((
            rentals::status.eq(RentalStatus::Completed.to_string()),
            rentals::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

        Ok(completed)
    }
}

use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    entities::{equipment::EquipmentEntity, rentals::RentalEntity},
    value_objects::enums::rental_statuses::RentalStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("equipment {name} is out of stock")]
pub struct OutOfStock {
    pub equipment_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockCheckError {
    #[error("equipment not found: {0}")]
    UnknownEquipment(Uuid),
    #[error(transparent)]
    OutOfStock(#[from] OutOfStock),
}

/// Result of a write that had to reserve equipment units atomically with the rental.
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationOutcome {
    Reserved(RentalEntity),
    /// Nothing was written; the named item had no unit left to decrement.
    OutOfStock(Uuid),
    /// Nothing was written; the storage layer detected an overlapping rental.
    SlotTaken,
    /// Nothing was written; the stored rental had already left `Confirmed`.
    NotConfirmed(RentalStatus),
    /// Nothing was written; payment has started, so the stored price can no longer change.
    PriceLocked,
}

/// Result of cancelling a rental and handing its units back to stock.
#[derive(Debug, Clone, PartialEq)]
pub enum CancellationOutcome {
    Cancelled(RentalEntity),
    /// Nothing was written; the stored rental was already in this status.
    NotConfirmed(RentalStatus),
}

/// One unit is reserved per listed id, so a repeated id reserves several units.
pub fn required_units(equipment_ids: &[Uuid]) -> HashMap<Uuid, i32> {
    let mut units = HashMap::new();
    for id in equipment_ids {
        *units.entry(*id).or_insert(0) += 1;
    }
    units
}

/// Checks the catalog snapshot before any write is attempted.
///
/// The snapshot can be stale, so storage still decrements with a `quantity >= 1` guard;
/// this only produces early, well-named errors.
pub fn check_stock(
    equipment_ids: &[Uuid],
    catalog: &[EquipmentEntity],
) -> Result<(), StockCheckError> {
    for (id, needed) in required_units(equipment_ids) {
        let item = catalog
            .iter()
            .find(|item| item.id == id)
            .ok_or(StockCheckError::UnknownEquipment(id))?;

        if !item.is_rentable() || item.quantity < needed {
            return Err(OutOfStock {
                equipment_id: item.id,
                name: item.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Same multiset of equipment, ignoring order.
pub fn same_equipment(current: &[Uuid], requested: &[Uuid]) -> bool {
    required_units(current) == required_units(requested)
}

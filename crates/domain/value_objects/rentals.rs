use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::rentals::RentalEntity;

/// Body of a create or update request. Omitting `equipment_ids` means no equipment on
/// create and "keep what is reserved" on update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RentalRequestModel {
    pub facility_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub equipment_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RentalDto {
    pub id: Uuid,
    pub renter_id: Uuid,
    pub facility_id: Uuid,
    pub equipment_ids: Vec<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: String,
    pub total_price: Option<f64>,
    pub payment_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RentalEntity> for RentalDto {
    fn from(value: RentalEntity) -> Self {
        Self {
            id: value.id,
            renter_id: value.renter_id,
            facility_id: value.facility_id,
            equipment_ids: value.equipment_ids,
            starts_at: value.starts_at,
            ends_at: value.ends_at,
            status: value.status,
            total_price: value.total_price,
            payment_status: value.payment_status,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RentalStatusDto {
    pub rental_id: Uuid,
    pub status: String,
    pub payment_status: String,
}

impl From<&RentalEntity> for RentalStatusDto {
    fn from(value: &RentalEntity) -> Self {
        Self {
            rental_id: value.id,
            status: value.status.clone(),
            payment_status: value.payment_status.clone(),
        }
    }
}

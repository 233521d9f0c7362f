use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        enums::{rental_payment_statuses::RentalPaymentStatus, rental_statuses::RentalStatus},
        pricing::to_minor_units,
    },
    infra::db::postgres::schema::rentals,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = rentals)]
pub struct RentalEntity {
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

impl RentalEntity {
    pub fn rental_status(&self) -> Option<RentalStatus> {
        RentalStatus::from_str(&self.status)
    }

    pub fn rental_payment_status(&self) -> Option<RentalPaymentStatus> {
        RentalPaymentStatus::from_str(&self.payment_status)
    }

    pub fn is_cancelled(&self) -> bool {
        self.rental_status() == Some(RentalStatus::Cancelled)
    }

    /// The processor charges the stored price once a payment has been started.
    pub fn price_locked(&self) -> bool {
        self.rental_payment_status() != Some(RentalPaymentStatus::Unpaid)
    }

    /// Whether `total_price` may replace the stored one, compared in cents.
    pub fn accepts_price(&self, total_price: Option<f64>) -> bool {
        !self.price_locked()
            || total_price.map(to_minor_units) == self.total_price.map(to_minor_units)
    }
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = rentals)]
pub struct InsertRentalEntity {
    pub renter_id: Uuid,
    pub facility_id: Uuid,
    pub equipment_ids: Vec<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: String,
    pub total_price: Option<f64>,
    pub payment_status: String,
}

/// New schedule for an existing rental. `equipment_ids` is left untouched when `None`;
/// otherwise it replaces the stored list and stock follows the difference.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = rentals)]
pub struct RescheduleRentalEntity {
    pub facility_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub total_price: Option<f64>,
    pub equipment_ids: Option<Vec<Uuid>>,
    pub updated_at: DateTime<Utc>,
}

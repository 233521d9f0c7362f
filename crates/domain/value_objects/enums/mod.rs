pub mod equipment_statuses;
pub mod payment_statuses;
pub mod rental_payment_statuses;
pub mod rental_statuses;

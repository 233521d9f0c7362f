pub mod booking_rules;
pub mod enums;
pub mod inventory;
pub mod payments;
pub mod pricing;
pub mod rentals;

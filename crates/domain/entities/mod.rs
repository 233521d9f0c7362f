pub mod equipment;
pub mod facilities;
pub mod payments;
pub mod rentals;

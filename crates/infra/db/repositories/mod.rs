pub mod catalog;
pub mod payments;
pub mod rentals;

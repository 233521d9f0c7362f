pub mod booking_locks;
pub mod payment_intents;
pub mod payment_reconciler;
pub mod rentals;
pub mod stripe_gateway;

#[cfg(test)]
pub mod test_support;

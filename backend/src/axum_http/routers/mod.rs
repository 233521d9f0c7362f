pub mod payments;
pub mod rentals;

#[cfg(test)]
mod captured_logs;

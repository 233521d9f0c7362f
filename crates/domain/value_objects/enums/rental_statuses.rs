use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Lifecycle of a rental. `Cancelled` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RentalStatus {
    Confirmed,
    Cancelled,
    Completed,
}

impl RentalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Confirmed => "CONFIRMED",
            RentalStatus::Cancelled => "CANCELLED",
            RentalStatus::Completed => "COMPLETED",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "CONFIRMED" => Some(RentalStatus::Confirmed),
            "CANCELLED" => Some(RentalStatus::Cancelled),
            "COMPLETED" => Some(RentalStatus::Completed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: RentalStatus) -> bool {
        matches!(
            (self, next),
            (RentalStatus::Confirmed, RentalStatus::Cancelled)
                | (RentalStatus::Confirmed, RentalStatus::Completed)
        )
    }
}

impl Display for RentalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Payment progress as seen from the rental. Only ever advances `Unpaid -> Pending -> Paid`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RentalPaymentStatus {
    Unpaid,
    Pending,
    Paid,
}

impl RentalPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalPaymentStatus::Unpaid => "UNPAID",
            RentalPaymentStatus::Pending => "PENDING",
            RentalPaymentStatus::Paid => "PAID",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "UNPAID" => Some(RentalPaymentStatus::Unpaid),
            "PENDING" => Some(RentalPaymentStatus::Pending),
            "PAID" => Some(RentalPaymentStatus::Paid),
            _ => None,
        }
    }
}

impl Display for RentalPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

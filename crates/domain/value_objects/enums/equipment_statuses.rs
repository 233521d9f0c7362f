use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentStatus {
    Available,
    Maintenance,
    Unavailable,
}

impl EquipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Available => "AVAILABLE",
            EquipmentStatus::Maintenance => "MAINTENANCE",
            EquipmentStatus::Unavailable => "UNAVAILABLE",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "AVAILABLE" => Some(EquipmentStatus::Available),
            "MAINTENANCE" => Some(EquipmentStatus::Maintenance),
            "UNAVAILABLE" => Some(EquipmentStatus::Unavailable),
            _ => None,
        }
    }
}

impl Display for EquipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

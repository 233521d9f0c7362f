use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::equipment_statuses::EquipmentStatus,
    infra::db::postgres::schema::equipment,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = equipment)]
pub struct EquipmentEntity {
    pub id: Uuid,
    pub facility_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub price_per_hour: f64,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

impl EquipmentEntity {
    pub fn is_rentable(&self) -> bool {
        EquipmentStatus::from_str(&self.status) == Some(EquipmentStatus::Available)
    }
}

use chrono::NaiveTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::booking_rules::OperatingHours,
    infra::db::postgres::schema::facilities,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = facilities)]
pub struct FacilityEntity {
    pub id: Uuid,
    pub name: String,
    pub opening_time: Option<NaiveTime>,
    pub closing_time: Option<NaiveTime>,
    pub price_per_hour: f64,
}

impl FacilityEntity {
    /// Operating hours, when the facility publishes both ends of the day.
    pub fn operating_hours(&self) -> Option<OperatingHours> {
        match (self.opening_time, self.closing_time) {
            (Some(opening), Some(closing)) => Some(OperatingHours { opening, closing }),
            _ => None,
        }
    }
}

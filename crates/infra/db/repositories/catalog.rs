use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, dsl::exists, prelude::*, select};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{app_users, equipment, facilities},
    },
};
use domain::{
    entities::{equipment::EquipmentEntity, facilities::FacilityEntity},
    repositories::catalog::CatalogRepository,
};

pub struct CatalogPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl CatalogPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl CatalogRepository for CatalogPostgres {
    async fn find_facility(&self, facility_id: Uuid) -> Result<Option<FacilityEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let facility = facilities::table
            .find(facility_id)
            .select(FacilityEntity::as_select())
            .first::<FacilityEntity>(&mut conn)
            .optional()?;

        Ok(facility)
    }

    async fn find_equipment(&self, equipment_ids: Vec<Uuid>) -> Result<Vec<EquipmentEntity>> {
        if equipment_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = Arc::clone(&self.db_pool).get()?;

        let items = equipment::table
            .filter(equipment::id.eq_any(equipment_ids))
            .select(EquipmentEntity::as_select())
            .load::<EquipmentEntity>(&mut conn)?;

        Ok(items)
    }

    async fn renter_exists(&self, renter_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let found = select(exists(app_users::table.filter(app_users::id.eq(renter_id))))
            .get_result::<bool>(&mut conn)?;

        Ok(found)
    }
}

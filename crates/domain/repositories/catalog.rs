use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::{equipment::EquipmentEntity, facilities::FacilityEntity};

#[async_trait]
#[automock]
pub trait CatalogRepository {
    async fn find_facility(&self, facility_id: Uuid) -> Result<Option<FacilityEntity>>;

    /// Distinct items for the given ids; unknown ids are simply absent.
    async fn find_equipment(&self, equipment_ids: Vec<Uuid>) -> Result<Vec<EquipmentEntity>>;

    async fn renter_exists(&self, renter_id: Uuid) -> Result<bool>;
}

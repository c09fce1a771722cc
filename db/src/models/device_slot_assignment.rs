use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Placement of one template in one device's local slot table.
///
/// `local_slot` must be unique among non-removed rows of a device; the
/// allocator guarantees this by running under the device's lock.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "device_slot_assignments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub template_id: i64,
    pub device_id: String,
    /// Sensor slot index in [1, device capacity].
    pub local_slot: i32,
    pub status: AssignmentStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_attempts: i32,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "assignment_status")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AssignmentStatus {
    /// Created server-side, not yet pushed to the device.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Confirmed on the device by a completed sync.
    #[sea_orm(string_value = "synced")]
    Synced,
    /// Template deleted centrally; device removes it on its next sync.
    #[sea_orm(string_value = "removal_pending")]
    RemovalPending,
    /// Removal confirmed; slot is free for reuse.
    #[sea_orm(string_value = "removed")]
    Removed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::fingerprint_template::Entity",
        from = "Column::TemplateId",
        to = "super::fingerprint_template::Column::Id"
    )]
    Template,
    #[sea_orm(
        belongs_to = "super::device::Entity",
        from = "Column::DeviceId",
        to = "super::device::Column::Id"
    )]
    Device,
}

impl Related<super::fingerprint_template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Template.def()
    }
}

impl Related<super::device::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl AssignmentStatus {
    /// Statuses that occupy a physical slot on the device.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, AssignmentStatus::Removed)
    }
}

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// An operation a device captured while disconnected, awaiting replay.
///
/// Rows are deleted once replayed successfully; after the retry cap they are
/// kept with `permanently_failed = true` so nothing disappears silently.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "offline_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub device_id: String,
    pub operation_type: OperationType,
    /// JSON payload, shape depends on the operation type.
    pub payload: String,
    pub attempt_count: i32,
    pub permanently_failed: bool,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "offline_operation_type")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OperationType {
    #[sea_orm(string_value = "enroll")]
    Enroll,
    #[sea_orm(string_value = "delete")]
    Delete,
    #[sea_orm(string_value = "biometric_event")]
    BiometricEvent,
    #[sea_orm(string_value = "status_update")]
    StatusUpdate,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::device::Entity",
        from = "Column::DeviceId",
        to = "super::device::Column::Id"
    )]
    Device,
}

impl Related<super::device::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

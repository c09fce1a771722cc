use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Append-only ledger of everything the sensors report.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "biometric_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub device_id: String,
    /// Absent for unmatched attempts and device-level events.
    pub user_id: Option<i64>,
    pub event_type: EventType,
    pub result: EventResult,
    /// Sensor match confidence, when the firmware reports one.
    pub confidence: Option<i32>,
    /// Set for failed auth attempts with no matched user; feeds the security audit trail.
    pub security_flagged: bool,
    pub device_timestamp: Option<DateTime<Utc>>,
    pub server_timestamp: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "biometric_event_type")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EventType {
    #[sea_orm(string_value = "auth")]
    Auth,
    #[sea_orm(string_value = "attendance")]
    Attendance,
    #[sea_orm(string_value = "enrollment")]
    Enrollment,
    #[sea_orm(string_value = "error")]
    Error,
    #[sea_orm(string_value = "heartbeat")]
    Heartbeat,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "biometric_event_result")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EventResult {
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failure")]
    Failure,
    #[sea_orm(string_value = "unknown")]
    Unknown,
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

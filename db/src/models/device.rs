use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A fingerprint-capture edge device (ESP32 + optical sensor).
///
/// Rows are created or refreshed by the sync handshake; admins may also
/// pre-register a device before it first phones home.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "devices")]
pub struct Model {
    /// Device identifier reported by the firmware (MAC-derived), not auto-generated.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub location: String,
    /// Last known network address, refreshed on contact.
    pub current_address: Option<String>,
    pub state: DeviceState,
    /// Sensor model, e.g. "AS608".
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    /// Fingerprint slots available on the sensor.
    pub capacity: i32,
    pub last_contact: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Connectivity state as tracked by the registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "device_state")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DeviceState {
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "offline")]
    Offline,
    #[sea_orm(string_value = "syncing")]
    Syncing,
    #[sea_orm(string_value = "error")]
    Error,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::device_slot_assignment::Entity")]
    Assignments,
    #[sea_orm(has_many = "super::offline_event::Entity")]
    OfflineEvents,
    #[sea_orm(has_many = "super::biometric_event::Entity")]
    BiometricEvents,
}

impl Related<super::device_slot_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignments.def()
    }
}

impl Related<super::offline_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OfflineEvents.def()
    }
}

impl Related<super::biometric_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BiometricEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

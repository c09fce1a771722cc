use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;

/// Central copy of one user's biometric template.
///
/// The payload is opaque to the server; matching happens on-device.
/// At most one active template exists per user; re-enrolling requires
/// deleting the current one first. Deletion is a soft-delete
/// (`active = false`) so the distribution history survives.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "fingerprint_templates")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    /// Opaque sensor template, base64 as delivered by the firmware.
    #[serde(skip_serializing)]
    pub payload: String,
    pub quality: i32,
    /// sha256 over user id + payload, rejects double submission.
    pub template_hash: String,
    /// Device the template was captured on, if enrolled at a sensor.
    pub origin_device: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::device_slot_assignment::Entity")]
    Assignments,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::device_slot_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Assignments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One physical ingress or egress, from a sensor match or a manual entry.
///
/// These rows are the sole input the attendance deriver interprets.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "raw_check_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub direction: CheckDirection,
    pub recorded_at: DateTime<Utc>,
    /// Device that produced the match, when biometric.
    pub origin_device: Option<String>,
    /// Who entered the record, when manual (preceptor corrections).
    pub manual_origin: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "check_direction")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CheckDirection {
    #[sea_orm(string_value = "ingress")]
    Ingress,
    #[sea_orm(string_value = "egress")]
    Egress,
}

impl CheckDirection {
    pub fn opposite(&self) -> Self {
        match self {
            CheckDirection::Ingress => CheckDirection::Egress,
            CheckDirection::Egress => CheckDirection::Ingress,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Minimal mirror of the user directory consumed by the sync pipeline.
///
/// Account management itself (passwords, sessions) lives outside this core;
/// sync responses only need id, dni, display name and role.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// National identity number, unique.
    pub dni: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "user_role")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UserRole {
    #[sea_orm(string_value = "student")]
    Student,
    #[sea_orm(string_value = "professor")]
    Professor,
    #[sea_orm(string_value = "preceptor")]
    Preceptor,
    #[sea_orm(string_value = "admin")]
    Admin,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::fingerprint_template::Entity")]
    Templates,
    #[sea_orm(has_many = "super::raw_check_record::Entity")]
    CheckRecords,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    AttendanceRecords,
    #[sea_orm(has_many = "super::user_course::Entity")]
    Courses,
}

impl Related<super::fingerprint_template::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Templates.def()
    }
}

impl Related<super::raw_check_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CheckRecords.def()
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttendanceRecords.def()
    }
}

impl Related<super::user_course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Courses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

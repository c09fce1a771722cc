use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Derived per-session attendance outcome for one student and date.
///
/// Unique on (user, session, date). Rows with `auto_computed = false` were
/// manually overridden and the deriver never touches them again.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub class_session_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub lunch_out: Option<DateTime<Utc>>,
    pub lunch_in: Option<DateTime<Utc>>,
    /// Whole minutes past the session start, set when the first ingress
    /// came after the grace window.
    pub minutes_late: Option<i64>,
    pub auto_computed: bool,
    /// Short derivation summary, e.g. record counts.
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "attendance_status")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AttendanceStatus {
    #[sea_orm(string_value = "present")]
    Present,
    #[sea_orm(string_value = "absent")]
    Absent,
    #[sea_orm(string_value = "late")]
    Late,
    /// Only ever set by manual override, never derived.
    #[sea_orm(string_value = "excused")]
    Excused,
    /// Check-in with no later egress; a partial-day signal, not "present".
    #[sea_orm(string_value = "incomplete")]
    Incomplete,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::class_session::Entity",
        from = "Column::ClassSessionId",
        to = "super::class_session::Column::Id"
    )]
    Session,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::class_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

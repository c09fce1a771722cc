//! Seams to the collaborator modules this core consumes but does not own:
//! the user directory, the weekly schedule, and the audit trail.
//!
//! Production uses the DB-backed implementations below; tests substitute
//! fakes where they need to steer schedules or capture audit entries.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use db::models::audit_log::{self, AuditScope};
use db::models::user::{self, UserRole};
use db::models::{class_session, user_course};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};

use crate::error::ServiceResult;

/// Directory view of a user, as the sync protocol needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryUser {
    pub id: i64,
    pub dni: String,
    pub full_name: String,
    pub role: UserRole,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, user_id: i64) -> ServiceResult<Option<DirectoryUser>>;

    /// Ids of every user with the student role, for batch derivation runs.
    async fn student_ids(&self) -> ServiceResult<Vec<i64>>;
}

/// One timetable block of a student's day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSession {
    pub id: i64,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
}

#[async_trait]
pub trait ScheduleProvider: Send + Sync {
    /// The sessions scheduled for this user on this date, earliest first.
    async fn sessions_on(&self, user_id: i64, date: NaiveDate)
        -> ServiceResult<Vec<ScheduledSession>>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(
        &self,
        scope: AuditScope,
        message: &str,
        source: Option<&str>,
        actor_user_id: Option<i64>,
    ) -> ServiceResult<()>;
}

#[derive(Clone)]
pub struct DbUserDirectory {
    db: DatabaseConnection,
}

impl DbUserDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for DbUserDirectory {
    async fn find_by_id(&self, user_id: i64) -> ServiceResult<Option<DirectoryUser>> {
        let found = user::Entity::find_by_id(user_id).one(&self.db).await?;
        Ok(found.map(|u| DirectoryUser {
            id: u.id,
            dni: u.dni.clone(),
            full_name: u.full_name(),
            role: u.role,
        }))
    }

    async fn student_ids(&self) -> ServiceResult<Vec<i64>> {
        let students = user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Student))
            .order_by_asc(user::Column::Id)
            .all(&self.db)
            .await?;
        Ok(students.into_iter().map(|u| u.id).collect())
    }
}

#[derive(Clone)]
pub struct DbScheduleProvider {
    db: DatabaseConnection,
}

impl DbScheduleProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ScheduleProvider for DbScheduleProvider {
    async fn sessions_on(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> ServiceResult<Vec<ScheduledSession>> {
        let memberships = user_course::Entity::find()
            .filter(user_course::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?;

        if memberships.is_empty() {
            return Ok(Vec::new());
        }

        let course_ids: Vec<i64> = memberships
            .into_iter()
            .map(|m| m.course_division_id)
            .collect();

        let weekday: class_session::Weekday = date.weekday().into();
        let sessions = class_session::Entity::find()
            .filter(class_session::Column::CourseDivisionId.is_in(course_ids))
            .filter(class_session::Column::Weekday.eq(weekday))
            .order_by_asc(class_session::Column::StartsAt)
            .all(&self.db)
            .await?;

        Ok(sessions
            .into_iter()
            .map(|s| ScheduledSession {
                id: s.id,
                starts_at: s.starts_at,
                ends_at: s.ends_at,
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct DbAuditLog {
    db: DatabaseConnection,
}

impl DbAuditLog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditLog for DbAuditLog {
    async fn append(
        &self,
        scope: AuditScope,
        message: &str,
        source: Option<&str>,
        actor_user_id: Option<i64>,
    ) -> ServiceResult<()> {
        audit_log::ActiveModel {
            id: NotSet,
            scope: Set(scope),
            message: Set(message.to_owned()),
            actor_user_id: Set(actor_user_id),
            source: Set(source.map(str::to_owned)),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}

//! Shared seeding helpers and fakes for the service tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use db::models::device::{self, DeviceState};
use db::models::device_slot_assignment::{self, AssignmentStatus};
use db::models::raw_check_record::{self, CheckDirection};
use db::models::user::{self, UserRole};
use db::models::{audit_log, class_session, fingerprint_template, user_course};
use sea_orm::{ActiveModelTrait, DatabaseConnection, NotSet, Set};
use std::sync::{Arc, Mutex};
use util::state::AppState;

use crate::attendance::AttendanceDeriver;
use crate::checkin::CheckRecorder;
use crate::collab::{
    AuditLog, DbScheduleProvider, DbUserDirectory, ScheduleProvider, ScheduledSession,
};
use crate::error::ServiceResult;
use crate::offline::OfflineEventQueue;
use crate::sync::SyncCoordinator;
use crate::templates::TemplateStore;

pub fn state_for(db: &DatabaseConnection) -> AppState {
    AppState::new(db.clone())
}

fn test_deriver() -> AttendanceDeriver {
    AttendanceDeriver::new(
        15,
        NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
    )
}

pub fn checkin_for(db: &DatabaseConnection) -> (CheckRecorder, CapturingAudit) {
    let audit = CapturingAudit::default();
    let recorder = CheckRecorder::new(
        Arc::new(DbUserDirectory::new(db.clone())),
        Arc::new(DbScheduleProvider::new(db.clone())),
        Arc::new(audit.clone()),
        test_deriver(),
    );
    (recorder, audit)
}

pub fn queue_for(db: &DatabaseConnection) -> (OfflineEventQueue, CapturingAudit) {
    let (recorder, audit) = checkin_for(db);
    let queue = OfflineEventQueue::new(recorder, Arc::new(audit.clone()));
    (queue, audit)
}

pub fn sync_for(db: &DatabaseConnection) -> (SyncCoordinator, CapturingAudit) {
    let (queue, audit) = queue_for(db);
    let coordinator = SyncCoordinator::new(
        queue,
        Arc::new(DbUserDirectory::new(db.clone())),
        Arc::new(audit.clone()),
    );
    (coordinator, audit)
}

pub async fn seed_student(
    db: &DatabaseConnection,
    dni: &str,
    first_name: &str,
    last_name: &str,
) -> user::Model {
    user::ActiveModel {
        id: NotSet,
        dni: Set(dni.to_owned()),
        first_name: Set(first_name.to_owned()),
        last_name: Set(last_name.to_owned()),
        role: Set(UserRole::Student),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_device(db: &DatabaseConnection, id: &str, capacity: i32) -> device::Model {
    seed_device_with_state(db, id, capacity, DeviceState::Online).await
}

pub async fn seed_offline_device(
    db: &DatabaseConnection,
    id: &str,
    capacity: i32,
) -> device::Model {
    seed_device_with_state(db, id, capacity, DeviceState::Offline).await
}

async fn seed_device_with_state(
    db: &DatabaseConnection,
    id: &str,
    capacity: i32,
    state: DeviceState,
) -> device::Model {
    let now = Utc::now();
    device::ActiveModel {
        id: Set(id.to_owned()),
        name: Set(id.to_owned()),
        location: Set("test lab".into()),
        current_address: Set(None),
        state: Set(state),
        model: Set(Some("AS608".into())),
        firmware_version: Set(Some("1.0.0".into())),
        capacity: Set(capacity),
        last_contact: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_template(
    db: &DatabaseConnection,
    user_id: i64,
    payload: &str,
) -> fingerprint_template::Model {
    fingerprint_template::ActiveModel {
        id: NotSet,
        user_id: Set(user_id),
        payload: Set(payload.to_owned()),
        quality: Set(80),
        template_hash: Set(TemplateStore::template_hash(user_id, payload)),
        origin_device: Set(None),
        active: Set(true),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_assignment(
    db: &DatabaseConnection,
    template_id: i64,
    device_id: &str,
    local_slot: i32,
    status: AssignmentStatus,
) -> device_slot_assignment::Model {
    device_slot_assignment::ActiveModel {
        id: NotSet,
        template_id: Set(template_id),
        device_id: Set(device_id.to_owned()),
        local_slot: Set(local_slot),
        status: Set(status),
        last_synced_at: Set(None),
        sync_attempts: Set(0),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn seed_session(
    db: &DatabaseConnection,
    course_division_id: i64,
    weekday: chrono::Weekday,
    starts_at: NaiveTime,
) -> class_session::Model {
    class_session::ActiveModel {
        id: NotSet,
        course_division_id: Set(course_division_id),
        weekday: Set(weekday.into()),
        starts_at: Set(starts_at),
        ends_at: Set(starts_at + Duration::hours(4)),
        subject: Set(Some("Mathematics".into())),
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn enroll_user_course(db: &DatabaseConnection, user_id: i64, course_division_id: i64) {
    user_course::ActiveModel {
        user_id: Set(user_id),
        course_division_id: Set(course_division_id),
    }
    .insert(db)
    .await
    .unwrap();
}

pub async fn seed_check(
    db: &DatabaseConnection,
    user_id: i64,
    direction: CheckDirection,
    recorded_at: DateTime<Utc>,
) -> raw_check_record::Model {
    raw_check_record::ActiveModel {
        id: NotSet,
        user_id: Set(user_id),
        direction: Set(direction),
        recorded_at: Set(recorded_at),
        origin_device: Set(None),
        manual_origin: Set(None),
    }
    .insert(db)
    .await
    .unwrap()
}

/// Captured audit entry, for asserting on the trail without a database.
#[derive(Debug, Clone)]
pub struct CapturedEntry {
    pub scope: audit_log::AuditScope,
    pub message: String,
    pub source: Option<String>,
    pub actor_user_id: Option<i64>,
}

#[derive(Clone, Default)]
pub struct CapturingAudit {
    entries: Arc<Mutex<Vec<CapturedEntry>>>,
}

impl CapturingAudit {
    pub fn entries(&self) -> Vec<CapturedEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditLog for CapturingAudit {
    async fn append(
        &self,
        scope: audit_log::AuditScope,
        message: &str,
        source: Option<&str>,
        actor_user_id: Option<i64>,
    ) -> ServiceResult<()> {
        self.entries.lock().unwrap().push(CapturedEntry {
            scope,
            message: message.to_owned(),
            source: source.map(str::to_owned),
            actor_user_id,
        });
        Ok(())
    }
}

/// Schedule fake that returns the same single session for every date.
pub struct FixedSchedule {
    sessions: Vec<ScheduledSession>,
}

impl FixedSchedule {
    pub fn single(id: i64, starts_at: NaiveTime) -> Self {
        Self {
            sessions: vec![ScheduledSession {
                id,
                starts_at,
                ends_at: starts_at + Duration::hours(4),
            }],
        }
    }
}

#[async_trait]
impl ScheduleProvider for FixedSchedule {
    async fn sessions_on(
        &self,
        _user_id: i64,
        _date: NaiveDate,
    ) -> ServiceResult<Vec<ScheduledSession>> {
        Ok(self.sessions.clone())
    }
}

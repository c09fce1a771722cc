//! Raw check recording: the ingress/egress stream attendance derivation
//! reads from, plus the device-facing authentication flow.
//!
//! Direction is never trusted from the sensor. Each new check alternates
//! against the user's last record of the same day, so a double scan reads
//! as out-then-in rather than two entries.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use db::models::audit_log::AuditScope;
use db::models::biometric_event::{EventResult, EventType};
use db::models::raw_check_record::{self, CheckDirection};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use util::state::AppState;

use crate::attendance::AttendanceDeriver;
use crate::collab::{AuditLog, DbAuditLog, DbScheduleProvider, DbUserDirectory, ScheduleProvider, UserDirectory};
use crate::devices::DeviceRegistry;
use crate::error::ServiceResult;
use crate::events::{EventRecorder, RecordedEvent};
use crate::templates::TemplateStore;

/// What the sensor is told after presenting a fingerprint. Unauthorized
/// outcomes deliberately carry no detail about why.
#[derive(Debug, Clone, Serialize)]
pub struct BiometricCheckOutcome {
    pub authorized: bool,
    pub user_name: Option<String>,
    pub direction: Option<CheckDirection>,
    pub recorded_at: DateTime<Utc>,
}

impl BiometricCheckOutcome {
    fn denied(recorded_at: DateTime<Utc>) -> Self {
        Self {
            authorized: false,
            user_name: None,
            direction: None,
            recorded_at,
        }
    }
}

#[derive(Clone)]
pub struct CheckRecorder {
    users: Arc<dyn UserDirectory>,
    schedule: Arc<dyn ScheduleProvider>,
    audit: Arc<dyn AuditLog>,
    deriver: AttendanceDeriver,
}

impl CheckRecorder {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        schedule: Arc<dyn ScheduleProvider>,
        audit: Arc<dyn AuditLog>,
        deriver: AttendanceDeriver,
    ) -> Self {
        Self {
            users,
            schedule,
            audit,
            deriver,
        }
    }

    pub fn from_db(db: DatabaseConnection) -> Self {
        Self::new(
            Arc::new(DbUserDirectory::new(db.clone())),
            Arc::new(DbScheduleProvider::new(db.clone())),
            Arc::new(DbAuditLog::new(db)),
            AttendanceDeriver::from_config(),
        )
    }

    /// The direction the next check for this user should take, based on the
    /// last record of the same day. A fresh day always starts with ingress.
    pub async fn next_direction(
        db: &DatabaseConnection,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> ServiceResult<CheckDirection> {
        let date = at.date_naive();
        let day_start = date.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);

        let last = raw_check_record::Entity::find()
            .filter(raw_check_record::Column::UserId.eq(user_id))
            .filter(raw_check_record::Column::RecordedAt.gte(day_start))
            .filter(raw_check_record::Column::RecordedAt.lt(day_end))
            .order_by_desc(raw_check_record::Column::RecordedAt)
            .order_by_desc(raw_check_record::Column::Id)
            .one(db)
            .await?;

        Ok(match last {
            Some(record) => record.direction.opposite(),
            None => CheckDirection::Ingress,
        })
    }

    /// Records one check with automatic direction and recomputes the user's
    /// attendance for that date.
    pub async fn record_check(
        &self,
        state: &AppState,
        user_id: i64,
        recorded_at: DateTime<Utc>,
        origin_device: Option<&str>,
    ) -> ServiceResult<raw_check_record::Model> {
        let db = state.db();
        let direction = Self::next_direction(db, user_id, recorded_at).await?;

        let record = raw_check_record::ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            direction: Set(direction),
            recorded_at: Set(recorded_at),
            origin_device: Set(origin_device.map(str::to_owned)),
            manual_origin: Set(None),
        }
        .insert(db)
        .await?;

        self.deriver
            .derive_for_student(state, self.schedule.as_ref(), user_id, recorded_at.date_naive())
            .await?;

        Ok(record)
    }

    /// Records a check entered by staff. The direction may be forced; when
    /// absent it alternates like a device check. The correction is audited.
    pub async fn record_manual(
        &self,
        state: &AppState,
        user_id: i64,
        direction: Option<CheckDirection>,
        recorded_at: DateTime<Utc>,
        actor_user_id: i64,
    ) -> ServiceResult<raw_check_record::Model> {
        let db = state.db();
        let direction = match direction {
            Some(d) => d,
            None => Self::next_direction(db, user_id, recorded_at).await?,
        };

        let record = raw_check_record::ActiveModel {
            id: NotSet,
            user_id: Set(user_id),
            direction: Set(direction),
            recorded_at: Set(recorded_at),
            origin_device: Set(None),
            manual_origin: Set(Some(format!("user:{actor_user_id}"))),
        }
        .insert(db)
        .await?;

        self.audit
            .append(
                AuditScope::User,
                &format!("manual {direction} check recorded for user {user_id}"),
                None,
                Some(actor_user_id),
            )
            .await?;

        self.deriver
            .derive_for_student(state, self.schedule.as_ref(), user_id, recorded_at.date_naive())
            .await?;

        Ok(record)
    }

    /// Full device-facing flow: resolve the fingerprint, log the event,
    /// record the check and refresh attendance. Every rejection path returns
    /// the same opaque denial.
    pub async fn handle_biometric_record(
        &self,
        state: &AppState,
        device_id: &str,
        template_payload: &str,
        confidence: Option<i32>,
        device_timestamp: Option<DateTime<Utc>>,
    ) -> ServiceResult<BiometricCheckOutcome> {
        let db = state.db();
        let recorded_at = device_timestamp.unwrap_or_else(Utc::now);

        let Some(device) = DeviceRegistry::find(db, device_id).await? else {
            self.audit
                .append(
                    AuditScope::Security,
                    &format!("biometric record from unregistered device {device_id}"),
                    Some(device_id),
                    None,
                )
                .await?;
            return Ok(BiometricCheckOutcome::denied(recorded_at));
        };

        let template = TemplateStore::identify(db, template_payload).await?;
        let user = match &template {
            Some(t) => self.users.find_by_id(t.user_id).await?,
            None => None,
        };

        let Some(user) = user else {
            EventRecorder::record(
                db,
                self.audit.as_ref(),
                RecordedEvent {
                    device_id: device.id,
                    user_id: None,
                    event_type: EventType::Auth,
                    result: EventResult::Failure,
                    confidence,
                    device_timestamp,
                },
            )
            .await?;
            return Ok(BiometricCheckOutcome::denied(recorded_at));
        };

        EventRecorder::record(
            db,
            self.audit.as_ref(),
            RecordedEvent {
                device_id: device.id.clone(),
                user_id: Some(user.id),
                event_type: EventType::Auth,
                result: EventResult::Success,
                confidence,
                device_timestamp,
            },
        )
        .await?;

        let record = self
            .record_check(state, user.id, recorded_at, Some(&device.id))
            .await?;

        info!(
            user = user.id,
            device = %device.id,
            direction = %record.direction,
            "biometric check accepted"
        );

        Ok(BiometricCheckOutcome {
            authorized: true,
            user_name: Some(user.full_name),
            direction: Some(record.direction),
            recorded_at: record.recorded_at,
        })
    }

    pub async fn list_for_user(
        db: &DatabaseConnection,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ServiceResult<Vec<raw_check_record::Model>> {
        Ok(raw_check_record::Entity::find()
            .filter(raw_check_record::Column::UserId.eq(user_id))
            .filter(raw_check_record::Column::RecordedAt.gte(from))
            .filter(raw_check_record::Column::RecordedAt.lte(to))
            .order_by_asc(raw_check_record::Column::RecordedAt)
            .all(db)
            .await?)
    }
}

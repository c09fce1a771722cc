//! Attendance derivation: turns the raw ingress/egress stream into one
//! attendance row per (student, session, date).
//!
//! Derivation is deterministic and re-runnable. Rows written by hand
//! (`auto_computed = false`, e.g. an excused absence) are never overwritten
//! by a recomputation.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use db::models::attendance_record::{self, AttendanceStatus};
use db::models::raw_check_record::{self, CheckDirection};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, NotSet, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tracing::{info, warn};
use util::config::AppConfig;
use util::state::AppState;

use crate::collab::{ScheduleProvider, UserDirectory};
use crate::error::{ServiceError, ServiceResult};

/// The day-level reading of a student's check stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayDerivation {
    pub status: AttendanceStatus,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub lunch_out: Option<DateTime<Utc>>,
    pub lunch_in: Option<DateTime<Utc>>,
    pub minutes_late: Option<i64>,
}

#[derive(Debug, Default, Serialize)]
pub struct RunStats {
    pub processed: u64,
    pub failed: u64,
}

#[derive(Debug, Serialize)]
pub struct AttendanceStats {
    pub total: u64,
    pub present: u64,
    pub absent: u64,
    pub late: u64,
    pub excused: u64,
    pub incomplete: u64,
    /// Share of sessions attended (present + late + incomplete over total).
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct AttendanceDeriver {
    grace: Duration,
    lunch_start: NaiveTime,
    lunch_end: NaiveTime,
}

impl AttendanceDeriver {
    pub fn new(grace_minutes: i64, lunch_start: NaiveTime, lunch_end: NaiveTime) -> Self {
        Self {
            grace: Duration::minutes(grace_minutes),
            lunch_start,
            lunch_end,
        }
    }

    pub fn from_config() -> Self {
        let config = AppConfig::global();
        Self::new(
            config.late_grace_minutes,
            config.lunch_window_start,
            config.lunch_window_end,
        )
    }

    /// Classifies one day of check records against the first session start.
    ///
    /// Rules, in order of precedence:
    /// - no ingress at all: absent;
    /// - ingress but no closing egress: incomplete;
    /// - first ingress within `start + grace` (inclusive): present;
    /// - later than that: late, with lateness measured from the session
    ///   start itself, not from the end of the grace window.
    ///
    /// An egress inside the lunch window followed by a same-window ingress
    /// is read as the lunch break, not as leaving for the day.
    pub fn classify(
        &self,
        records: &[raw_check_record::Model],
        session_start: NaiveTime,
        date: NaiveDate,
    ) -> DayDerivation {
        let mut day: Vec<&raw_check_record::Model> = records
            .iter()
            .filter(|r| r.recorded_at.date_naive() == date)
            .collect();
        day.sort_by_key(|r| r.recorded_at);

        let check_in = day
            .iter()
            .find(|r| r.direction == CheckDirection::Ingress)
            .map(|r| r.recorded_at);

        let Some(check_in) = check_in else {
            return DayDerivation {
                status: AttendanceStatus::Absent,
                check_in: None,
                check_out: None,
                lunch_out: None,
                lunch_in: None,
                minutes_late: None,
            };
        };

        let window_start = date.and_time(self.lunch_start).and_utc();
        let window_end = date.and_time(self.lunch_end).and_utc();
        let in_window = |at: DateTime<Utc>| at >= window_start && at <= window_end;

        // the latest in-window egress; an earlier egress/ingress pair inside
        // the window reads as a short errand, not the lunch break
        let lunch_out = day
            .iter()
            .filter(|r| {
                r.direction == CheckDirection::Egress
                    && r.recorded_at > check_in
                    && in_window(r.recorded_at)
            })
            .last()
            .map(|r| r.recorded_at);

        let lunch_in = lunch_out.and_then(|out| {
            day.iter()
                .find(|r| {
                    r.direction == CheckDirection::Ingress
                        && r.recorded_at > out
                        && in_window(r.recorded_at)
                })
                .map(|r| r.recorded_at)
        });

        let check_out = day
            .iter()
            .rev()
            .find(|r| {
                r.direction == CheckDirection::Egress
                    && r.recorded_at > check_in
                    && Some(r.recorded_at) != lunch_out
            })
            .map(|r| r.recorded_at);

        let start = date.and_time(session_start).and_utc();
        let (status, minutes_late) = if check_in <= start + self.grace {
            (AttendanceStatus::Present, None)
        } else {
            let minutes = (check_in - start).num_minutes();
            (AttendanceStatus::Late, Some(minutes))
        };

        let status = if check_out.is_none() {
            AttendanceStatus::Incomplete
        } else {
            status
        };

        DayDerivation {
            status,
            check_in: Some(check_in),
            check_out,
            lunch_out,
            lunch_in,
            minutes_late,
        }
    }

    /// Recomputes one student's attendance rows for one date. Returns the
    /// number of rows written; manual rows are counted as skipped, not
    /// written.
    pub async fn derive_for_student(
        &self,
        state: &AppState,
        schedule: &dyn ScheduleProvider,
        user_id: i64,
        date: NaiveDate,
    ) -> ServiceResult<u64> {
        let lock = state.derivation_lock(user_id, date);
        let _guard = lock.lock().await;

        let sessions = schedule.sessions_on(user_id, date).await?;
        if sessions.is_empty() {
            return Ok(0);
        }

        let db = state.db();
        let day_start = date
            .and_time(NaiveTime::MIN)
            .and_utc();
        let day_end = day_start + Duration::days(1);

        let records = raw_check_record::Entity::find()
            .filter(raw_check_record::Column::UserId.eq(user_id))
            .filter(raw_check_record::Column::RecordedAt.gte(day_start))
            .filter(raw_check_record::Column::RecordedAt.lt(day_end))
            .order_by_asc(raw_check_record::Column::RecordedAt)
            .all(db)
            .await?;

        let derivation = self.classify(&records, sessions[0].starts_at, date);

        let mut written = 0;
        for session in &sessions {
            let existing = attendance_record::Entity::find()
                .filter(attendance_record::Column::UserId.eq(user_id))
                .filter(attendance_record::Column::ClassSessionId.eq(session.id))
                .filter(attendance_record::Column::Date.eq(date))
                .one(db)
                .await?;

            match existing {
                Some(row) if !row.auto_computed => continue,
                Some(row) => {
                    let mut active: attendance_record::ActiveModel = row.into();
                    active.status = Set(derivation.status);
                    active.check_in = Set(derivation.check_in);
                    active.check_out = Set(derivation.check_out);
                    active.lunch_out = Set(derivation.lunch_out);
                    active.lunch_in = Set(derivation.lunch_in);
                    active.minutes_late = Set(derivation.minutes_late);
                    active.updated_at = Set(Utc::now());
                    active.update(db).await?;
                }
                None => {
                    attendance_record::ActiveModel {
                        id: NotSet,
                        user_id: Set(user_id),
                        class_session_id: Set(session.id),
                        date: Set(date),
                        status: Set(derivation.status),
                        check_in: Set(derivation.check_in),
                        check_out: Set(derivation.check_out),
                        lunch_out: Set(derivation.lunch_out),
                        lunch_in: Set(derivation.lunch_in),
                        minutes_late: Set(derivation.minutes_late),
                        auto_computed: Set(true),
                        notes: Set(None),
                        updated_at: Set(Utc::now()),
                    }
                    .insert(db)
                    .await?;
                }
            }
            written += 1;
        }
        Ok(written)
    }

    /// Derives every student for one date. A failure for one student is
    /// logged and counted, never aborts the rest of the run.
    pub async fn run_for_date(
        &self,
        state: &AppState,
        users: &dyn UserDirectory,
        schedule: &dyn ScheduleProvider,
        date: NaiveDate,
    ) -> ServiceResult<RunStats> {
        let mut stats = RunStats::default();
        for user_id in users.student_ids().await? {
            match self.derive_for_student(state, schedule, user_id, date).await {
                Ok(_) => stats.processed += 1,
                Err(err) => {
                    warn!(user = user_id, %date, error = %err, "attendance derivation failed");
                    stats.failed += 1;
                }
            }
        }
        info!(
            %date,
            processed = stats.processed,
            failed = stats.failed,
            "attendance derivation run finished"
        );
        Ok(stats)
    }

    pub async fn run_for_range(
        &self,
        state: &AppState,
        users: &dyn UserDirectory,
        schedule: &dyn ScheduleProvider,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ServiceResult<RunStats> {
        if from > to {
            return Err(ServiceError::validation("range start is after range end"));
        }
        let mut total = RunStats::default();
        let mut date = from;
        while date <= to {
            let stats = self.run_for_date(state, users, schedule, date).await?;
            total.processed += stats.processed;
            total.failed += stats.failed;
            date += Duration::days(1);
        }
        Ok(total)
    }
}

/// Writes a manual attendance row. Manual rows win over any future
/// recomputation for the same (user, session, date).
pub async fn record_manual(
    state: &AppState,
    user_id: i64,
    class_session_id: i64,
    date: NaiveDate,
    status: AttendanceStatus,
    notes: Option<String>,
) -> ServiceResult<attendance_record::Model> {
    let lock = state.derivation_lock(user_id, date);
    let _guard = lock.lock().await;

    let db = state.db();
    let existing = attendance_record::Entity::find()
        .filter(attendance_record::Column::UserId.eq(user_id))
        .filter(attendance_record::Column::ClassSessionId.eq(class_session_id))
        .filter(attendance_record::Column::Date.eq(date))
        .one(db)
        .await?;

    let saved = match existing {
        Some(row) => {
            let mut active: attendance_record::ActiveModel = row.into();
            active.status = Set(status);
            active.auto_computed = Set(false);
            active.notes = Set(notes);
            active.updated_at = Set(Utc::now());
            active.update(db).await?
        }
        None => {
            attendance_record::ActiveModel {
                id: NotSet,
                user_id: Set(user_id),
                class_session_id: Set(class_session_id),
                date: Set(date),
                status: Set(status),
                check_in: Set(None),
                check_out: Set(None),
                lunch_out: Set(None),
                lunch_in: Set(None),
                minutes_late: Set(None),
                auto_computed: Set(false),
                notes: Set(notes),
                updated_at: Set(Utc::now()),
            }
            .insert(db)
            .await?
        }
    };
    Ok(saved)
}

pub async fn student_stats(
    state: &AppState,
    user_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> ServiceResult<AttendanceStats> {
    let rows = attendance_record::Entity::find()
        .filter(attendance_record::Column::UserId.eq(user_id))
        .filter(attendance_record::Column::Date.gte(from))
        .filter(attendance_record::Column::Date.lte(to))
        .all(state.db())
        .await?;

    let mut stats = AttendanceStats {
        total: rows.len() as u64,
        present: 0,
        absent: 0,
        late: 0,
        excused: 0,
        incomplete: 0,
        attendance_rate: 0.0,
    };
    for row in &rows {
        match row.status {
            AttendanceStatus::Present => stats.present += 1,
            AttendanceStatus::Absent => stats.absent += 1,
            AttendanceStatus::Late => stats.late += 1,
            AttendanceStatus::Excused => stats.excused += 1,
            AttendanceStatus::Incomplete => stats.incomplete += 1,
        }
    }
    if stats.total > 0 {
        stats.attendance_rate =
            (stats.present + stats.late + stats.incomplete) as f64 / stats.total as f64;
    }
    Ok(stats)
}

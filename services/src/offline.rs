//! Store-and-forward queue for disconnected devices.
//!
//! Two things land here: operations the server could not push to an offline
//! device (enroll, delete), and event batches a device buffered locally
//! while it had no link. Replay runs per device under the replay lock,
//! oldest first, and each entry is retried up to the configured cap before
//! it is parked as permanently failed.

use chrono::{DateTime, Utc};
use db::models::audit_log::AuditScope;
use db::models::device::DeviceState;
use db::models::device_slot_assignment::{self, AssignmentStatus};
use db::models::fingerprint_template;
use db::models::offline_event::{self, OperationType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use util::config::AppConfig;
use util::state::AppState;

use crate::checkin::CheckRecorder;
use crate::collab::{AuditLog, DbAuditLog};
use crate::devices::DeviceRegistry;
use crate::error::{ServiceError, ServiceResult};
use crate::templates::TemplateStore;

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollPayload {
    pub template_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletePayload {
    pub template_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BiometricEventPayload {
    pub template_payload: String,
    pub confidence: Option<i32>,
    pub device_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdatePayload {
    pub state: DeviceState,
    pub address: Option<String>,
}

/// One entry of a device-uploaded backlog batch.
#[derive(Debug, Deserialize)]
pub struct IncomingOfflineEvent {
    pub operation_type: OperationType,
    pub payload: serde_json::Value,
}

#[derive(Debug, Default, Serialize)]
pub struct ReplayStats {
    pub processed: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct OfflineEventQueue {
    checkin: CheckRecorder,
    audit: Arc<dyn AuditLog>,
}

impl OfflineEventQueue {
    pub fn new(checkin: CheckRecorder, audit: Arc<dyn AuditLog>) -> Self {
        Self { checkin, audit }
    }

    pub fn from_db(db: DatabaseConnection) -> Self {
        Self::new(
            CheckRecorder::from_db(db.clone()),
            Arc::new(DbAuditLog::new(db)),
        )
    }

    pub async fn enqueue(
        db: &DatabaseConnection,
        device_id: &str,
        operation_type: OperationType,
        payload: serde_json::Value,
    ) -> ServiceResult<offline_event::Model> {
        let stored = offline_event::ActiveModel {
            id: NotSet,
            device_id: Set(device_id.to_owned()),
            operation_type: Set(operation_type),
            payload: Set(payload.to_string()),
            attempt_count: Set(0),
            permanently_failed: Set(false),
            enqueued_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;
        Ok(stored)
    }

    pub async fn enqueue_enroll(
        db: &DatabaseConnection,
        device_id: &str,
        template_id: i64,
    ) -> ServiceResult<offline_event::Model> {
        Self::enqueue(
            db,
            device_id,
            OperationType::Enroll,
            serde_json::json!(EnrollPayload { template_id }),
        )
        .await
    }

    /// Accepts a backlog batch uploaded by a device, then drains the whole
    /// queue for that device, oldest entries first.
    pub async fn process_batch(
        &self,
        state: &AppState,
        device_id: &str,
        batch: Vec<IncomingOfflineEvent>,
    ) -> ServiceResult<ReplayStats> {
        let db = state.db();
        for event in batch {
            Self::enqueue(db, device_id, event.operation_type, event.payload).await?;
        }
        self.replay_backlog(state, device_id).await
    }

    /// Replays every live queue entry for one device. Entries that succeed
    /// are deleted; entries that fail stay queued with a bumped attempt
    /// count until the retry cap parks them.
    pub async fn replay_backlog(
        &self,
        state: &AppState,
        device_id: &str,
    ) -> ServiceResult<ReplayStats> {
        let lock = state.replay_lock(device_id);
        let _guard = lock.lock().await;

        let db = state.db();
        let max_retries = AppConfig::global().offline_max_retries;

        let backlog = offline_event::Entity::find()
            .filter(offline_event::Column::DeviceId.eq(device_id))
            .filter(offline_event::Column::PermanentlyFailed.eq(false))
            .order_by_asc(offline_event::Column::EnqueuedAt)
            .order_by_asc(offline_event::Column::Id)
            .all(db)
            .await?;

        let mut stats = ReplayStats::default();
        for entry in backlog {
            match self.dispatch(state, &entry).await {
                Ok(()) => {
                    offline_event::Entity::delete_by_id(entry.id).exec(db).await?;
                    stats.processed += 1;
                }
                Err(err) => {
                    stats.failed += 1;
                    let attempts = entry.attempt_count + 1;
                    let exhausted = attempts >= max_retries;
                    warn!(
                        device = %device_id,
                        event = entry.id,
                        attempts,
                        error = %err,
                        "offline event replay failed"
                    );

                    let entry_id = entry.id;
                    let operation = entry.operation_type;
                    let mut active: offline_event::ActiveModel = entry.into();
                    active.attempt_count = Set(attempts);
                    if exhausted {
                        active.permanently_failed = Set(true);
                    }
                    active.update(db).await?;

                    if exhausted {
                        self.audit
                            .append(
                                AuditScope::Security,
                                &format!(
                                    "offline {operation} event {entry_id} from device {device_id} dropped after {attempts} attempts"
                                ),
                                Some(device_id),
                                None,
                            )
                            .await?;
                    }
                }
            }
        }

        if stats.processed > 0 || stats.failed > 0 {
            info!(
                device = %device_id,
                processed = stats.processed,
                failed = stats.failed,
                "offline backlog replayed"
            );
        }
        Ok(stats)
    }

    async fn dispatch(&self, state: &AppState, entry: &offline_event::Model) -> ServiceResult<()> {
        let db = state.db();
        match entry.operation_type {
            OperationType::Enroll => {
                let payload: EnrollPayload = parse(&entry.payload)?;
                let template = fingerprint_template::Entity::find_by_id(payload.template_id)
                    .one(db)
                    .await?;
                match template {
                    // template was deleted while queued, nothing to push
                    None => Ok(()),
                    Some(t) if !t.active => Ok(()),
                    Some(t) => TemplateStore::assign_to_device(state, t.id, &entry.device_id)
                        .await
                        .map(|_| ()),
                }
            }
            OperationType::Delete => {
                let payload: DeletePayload = parse(&entry.payload)?;
                let assignment = device_slot_assignment::Entity::find()
                    .filter(device_slot_assignment::Column::TemplateId.eq(payload.template_id))
                    .filter(device_slot_assignment::Column::DeviceId.eq(entry.device_id.clone()))
                    .filter(device_slot_assignment::Column::Status.ne(AssignmentStatus::Removed))
                    .one(db)
                    .await?;
                if let Some(assignment) = assignment {
                    let next = match assignment.status {
                        AssignmentStatus::Pending => AssignmentStatus::Removed,
                        _ => AssignmentStatus::RemovalPending,
                    };
                    let mut active: device_slot_assignment::ActiveModel = assignment.into();
                    active.status = Set(next);
                    active.update(db).await?;
                }
                Ok(())
            }
            OperationType::BiometricEvent => {
                let payload: BiometricEventPayload = parse(&entry.payload)?;
                self.checkin
                    .handle_biometric_record(
                        state,
                        &entry.device_id,
                        &payload.template_payload,
                        payload.confidence,
                        payload.device_timestamp,
                    )
                    .await
                    .map(|_| ())
            }
            OperationType::StatusUpdate => {
                let payload: StatusUpdatePayload = parse(&entry.payload)?;
                DeviceRegistry::update_status(
                    db,
                    &entry.device_id,
                    payload.state,
                    payload.address.as_deref(),
                )
                .await
                .map(|_| ())
            }
        }
    }

    pub async fn pending_for(
        db: &DatabaseConnection,
        device_id: &str,
    ) -> ServiceResult<Vec<offline_event::Model>> {
        Ok(offline_event::Entity::find()
            .filter(offline_event::Column::DeviceId.eq(device_id))
            .filter(offline_event::Column::PermanentlyFailed.eq(false))
            .order_by_asc(offline_event::Column::EnqueuedAt)
            .all(db)
            .await?)
    }

    pub async fn list_failed(db: &DatabaseConnection) -> ServiceResult<Vec<offline_event::Model>> {
        Ok(offline_event::Entity::find()
            .filter(offline_event::Column::PermanentlyFailed.eq(true))
            .order_by_asc(offline_event::Column::EnqueuedAt)
            .all(db)
            .await?)
    }
}

fn parse<T: for<'de> Deserialize<'de>>(raw: &str) -> ServiceResult<T> {
    serde_json::from_str(raw)
        .map_err(|err| ServiceError::DataIntegrity(format!("malformed queue payload: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::NewTemplate;
    use crate::test_support::{
        queue_for, seed_device, seed_offline_device, seed_student, state_for,
    };
    use db::test_utils::setup_test_db;
    use serial_test::serial;

    #[tokio::test]
    async fn queued_enrolls_land_when_device_reconnects() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        seed_offline_device(&db, "esp32-away", 127).await;

        let outcome = TemplateStore::enroll(
            &state,
            NewTemplate {
                user_id: user.id,
                payload: "FP_A".into(),
                quality: 85,
                origin_device: None,
            },
        )
        .await
        .unwrap();

        // nothing assigned yet, only queued
        assert!(device_slot_assignment::Entity::find()
            .all(&db)
            .await
            .unwrap()
            .is_empty());

        let (queue, _audit) = queue_for(&db);
        let stats = queue.replay_backlog(&state, "esp32-away").await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 0);

        let assignments = device_slot_assignment::Entity::find().all(&db).await.unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].template_id, outcome.template.id);
        assert_eq!(assignments[0].status, AssignmentStatus::Pending);

        // queue is drained
        assert!(OfflineEventQueue::pending_for(&db, "esp32-away")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn enroll_for_deleted_template_is_dropped_silently() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        seed_offline_device(&db, "esp32-away", 127).await;

        OfflineEventQueue::enqueue_enroll(&db, "esp32-away", 4242)
            .await
            .unwrap();

        let (queue, _audit) = queue_for(&db);
        let stats = queue.replay_backlog(&state, "esp32-away").await.unwrap();
        assert_eq!(stats.processed, 1);
        assert!(device_slot_assignment::Entity::find()
            .all(&db)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn malformed_entries_park_after_the_retry_cap() {
        util::config::AppConfig::reset();
        let db = setup_test_db().await;
        let state = state_for(&db);
        seed_device(&db, "esp32-a", 127).await;

        OfflineEventQueue::enqueue(
            &db,
            "esp32-a",
            OperationType::Enroll,
            serde_json::json!({"not": "an enroll payload"}),
        )
        .await
        .unwrap();

        let (queue, audit) = queue_for(&db);
        for _ in 0..3 {
            let stats = queue.replay_backlog(&state, "esp32-a").await.unwrap();
            assert_eq!(stats.failed, 1);
        }

        let failed = OfflineEventQueue::list_failed(&db).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempt_count, 3);

        // parked entries are no longer retried
        let stats = queue.replay_backlog(&state, "esp32-a").await.unwrap();
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.processed, 0);

        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].scope, AuditScope::Security);
    }

    #[tokio::test]
    async fn failing_batch_entry_does_not_block_later_ones() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        seed_device(&db, "esp32-a", 127).await;

        let (queue, _audit) = queue_for(&db);
        let stats = queue
            .process_batch(
                &state,
                "esp32-a",
                vec![
                    IncomingOfflineEvent {
                        operation_type: OperationType::StatusUpdate,
                        payload: serde_json::json!(StatusUpdatePayload {
                            state: DeviceState::Online,
                            address: None,
                        }),
                    },
                    IncomingOfflineEvent {
                        operation_type: OperationType::Enroll,
                        payload: serde_json::json!({"garbled": true}),
                    },
                    IncomingOfflineEvent {
                        operation_type: OperationType::BiometricEvent,
                        payload: serde_json::json!(BiometricEventPayload {
                            template_payload: "UNKNOWN".into(),
                            confidence: Some(40),
                            device_timestamp: None,
                        }),
                    },
                ],
            )
            .await
            .unwrap();

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 1);

        // the third entry ran despite the second failing: its denial left
        // an event row behind
        let events = db::models::biometric_event::Entity::find()
            .all(&db)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);

        // the failing entry stays queued for the next replay
        let pending = OfflineEventQueue::pending_for(&db, "esp32-a").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation_type, OperationType::Enroll);
        assert_eq!(pending[0].attempt_count, 1);
    }

    #[tokio::test]
    async fn uploaded_batch_is_processed_in_order() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        seed_device(&db, "esp32-a", 127).await;

        let (queue, _audit) = queue_for(&db);
        let stats = queue
            .process_batch(
                &state,
                "esp32-a",
                vec![
                    IncomingOfflineEvent {
                        operation_type: OperationType::StatusUpdate,
                        payload: serde_json::json!(StatusUpdatePayload {
                            state: DeviceState::Online,
                            address: Some("10.0.0.5".into()),
                        }),
                    },
                    IncomingOfflineEvent {
                        operation_type: OperationType::BiometricEvent,
                        payload: serde_json::json!(BiometricEventPayload {
                            template_payload: "UNKNOWN".into(),
                            confidence: Some(35),
                            device_timestamp: None,
                        }),
                    },
                ],
            )
            .await
            .unwrap();

        // an unauthorized scan still counts as processed, the denial is the
        // outcome, not a replay failure
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 0);

        let device = DeviceRegistry::get(&db, "esp32-a").await.unwrap();
        assert_eq!(device.current_address.as_deref(), Some("10.0.0.5"));
    }
}

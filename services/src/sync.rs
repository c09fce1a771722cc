//! Device sync handshake.
//!
//! A sync is the only moment a device's local slot memory is reconciled
//! with the central store: queued offline work is replayed first, then the
//! device receives the full desired template set for its slots and the
//! users it must erase locally. The handshake is serialized per device and bounded
//! by the configured timeout; a device that cannot complete it is parked
//! in the error state for an operator to look at.

use chrono::{DateTime, Utc};
use db::models::audit_log::AuditScope;
use db::models::device::DeviceState;
use db::models::device_slot_assignment::{self, AssignmentStatus};
use db::models::fingerprint_template;
use db::models::user::UserRole;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use util::config::AppConfig;
use util::state::AppState;

use crate::collab::{AuditLog, DbAuditLog, DbUserDirectory, UserDirectory};
use crate::devices::DeviceRegistry;
use crate::error::{ServiceError, ServiceResult};
use crate::offline::{IncomingOfflineEvent, OfflineEventQueue, ReplayStats};

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub device_id: String,
    /// How many templates the device believes it holds, for drift logging.
    pub current_fingerprints: Option<i32>,
    pub firmware_version: Option<String>,
    pub current_address: Option<String>,
    /// The device's view of its previous successful sync, informational.
    pub last_sync: Option<DateTime<Utc>>,
    /// Events the device buffered while disconnected.
    #[serde(default)]
    pub offline_events: Vec<IncomingOfflineEvent>,
}

/// One template the device must hold, and the slot it should occupy.
#[derive(Debug, Serialize)]
pub struct SyncFingerprint {
    pub user_id: i64,
    pub dni: String,
    pub name: String,
    pub role: UserRole,
    pub template: String,
    pub quality: i32,
    pub slot_recommendation: i32,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub device_id: String,
    /// The complete desired slot contents after this sync; the device
    /// overwrites its local table rather than merging.
    pub fingerprints: Vec<SyncFingerprint>,
    /// Users whose templates the device must erase locally.
    pub devices_to_remove: Vec<i64>,
    pub replay: ReplayStats,
    pub sync_timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SyncCoordinator {
    queue: OfflineEventQueue,
    users: Arc<dyn UserDirectory>,
    audit: Arc<dyn AuditLog>,
}

impl SyncCoordinator {
    pub fn new(
        queue: OfflineEventQueue,
        users: Arc<dyn UserDirectory>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            queue,
            users,
            audit,
        }
    }

    pub fn from_db(db: DatabaseConnection) -> Self {
        Self::new(
            OfflineEventQueue::from_db(db.clone()),
            Arc::new(DbUserDirectory::new(db.clone())),
            Arc::new(DbAuditLog::new(db)),
        )
    }

    /// Runs a full sync for one device. Re-running a sync with no
    /// intervening changes returns the same template set and erases nothing.
    pub async fn handle_sync_request(
        &self,
        state: &AppState,
        request: SyncRequest,
    ) -> ServiceResult<SyncResponse> {
        if request.device_id.trim().is_empty() {
            return Err(ServiceError::validation("device id must not be empty"));
        }

        let db = state.db();
        let reported_count = request.current_fingerprints;
        let device = DeviceRegistry::ensure_for_handshake(
            db,
            &request.device_id,
            request.firmware_version.as_deref(),
            request.current_address.as_deref(),
        )
        .await?;

        // Replay before the handshake takes the device lock: a queued enroll
        // allocates slots under that same lock.
        let replay = self
            .queue
            .process_batch(state, &device.id, request.offline_events)
            .await?;

        let timeout = Duration::from_secs(AppConfig::global().sync_timeout_seconds);
        let lock = state.device_lock(&device.id);
        let guard = lock.lock().await;

        let handshake = tokio::time::timeout(timeout, self.reconcile(state, &device.id)).await;
        drop(guard);

        match handshake {
            Ok(Ok((fingerprints, devices_to_remove))) => {
                DeviceRegistry::update_status(db, &device.id, DeviceState::Online, None).await?;
                if let Some(reported) = reported_count {
                    if reported as usize != fingerprints.len() {
                        info!(
                            device = %device.id,
                            reported,
                            desired = fingerprints.len(),
                            "device template count differs from desired set"
                        );
                    }
                }
                info!(
                    device = %device.id,
                    fingerprints = fingerprints.len(),
                    removals = devices_to_remove.len(),
                    "sync completed"
                );
                Ok(SyncResponse {
                    success: true,
                    device_id: device.id,
                    fingerprints,
                    devices_to_remove,
                    replay,
                    sync_timestamp: Utc::now(),
                })
            }
            Ok(Err(err)) => {
                DeviceRegistry::update_status(db, &device.id, DeviceState::Error, None).await?;
                Err(err)
            }
            Err(_) => {
                DeviceRegistry::update_status(db, &device.id, DeviceState::Error, None).await?;
                self.audit
                    .append(
                        AuditScope::System,
                        &format!(
                            "sync for device {} exceeded {}s and was aborted",
                            device.id,
                            timeout.as_secs()
                        ),
                        Some(&device.id),
                        None,
                    )
                    .await?;
                warn!(device = %device.id, "sync timed out");
                Err(ServiceError::sync(format!(
                    "sync for device {} timed out",
                    device.id
                )))
            }
        }
    }

    /// Walks the device's assignments: confirms removals, promotes pending
    /// entries to synced and returns the desired slot contents plus the
    /// users the device must erase.
    async fn reconcile(
        &self,
        state: &AppState,
        device_id: &str,
    ) -> ServiceResult<(Vec<SyncFingerprint>, Vec<i64>)> {
        let db = state.db();

        DeviceRegistry::update_status(db, device_id, DeviceState::Syncing, None).await?;

        let mut devices_to_remove = Vec::new();
        let removals = device_slot_assignment::Entity::find()
            .filter(device_slot_assignment::Column::DeviceId.eq(device_id))
            .filter(device_slot_assignment::Column::Status.eq(AssignmentStatus::RemovalPending))
            .all(db)
            .await?;
        for assignment in removals {
            if let Some(template) =
                fingerprint_template::Entity::find_by_id(assignment.template_id)
                    .one(db)
                    .await?
            {
                if !devices_to_remove.contains(&template.user_id) {
                    devices_to_remove.push(template.user_id);
                }
            }
            let mut active: device_slot_assignment::ActiveModel = assignment.into();
            active.status = Set(AssignmentStatus::Removed);
            active.last_synced_at = Set(Some(Utc::now()));
            active.update(db).await?;
        }

        let live = device_slot_assignment::Entity::find()
            .filter(device_slot_assignment::Column::DeviceId.eq(device_id))
            .filter(
                device_slot_assignment::Column::Status
                    .is_in([AssignmentStatus::Pending, AssignmentStatus::Synced]),
            )
            .order_by_asc(device_slot_assignment::Column::TemplateId)
            .all(db)
            .await?;

        let mut fingerprints = Vec::with_capacity(live.len());
        for assignment in live {
            let Some(template) =
                fingerprint_template::Entity::find_by_id(assignment.template_id)
                    .one(db)
                    .await?
            else {
                warn!(
                    assignment = assignment.id,
                    "assignment points at a missing template, skipping"
                );
                continue;
            };
            let Some(user) = self.users.find_by_id(template.user_id).await? else {
                warn!(
                    template = template.id,
                    "template owner missing from directory, skipping"
                );
                continue;
            };

            fingerprints.push(SyncFingerprint {
                user_id: user.id,
                dni: user.dni,
                name: user.full_name,
                role: user.role,
                template: template.payload,
                quality: template.quality,
                slot_recommendation: assignment.local_slot,
            });

            if assignment.status == AssignmentStatus::Pending {
                let attempts = assignment.sync_attempts + 1;
                let mut active: device_slot_assignment::ActiveModel = assignment.into();
                active.status = Set(AssignmentStatus::Synced);
                active.last_synced_at = Set(Some(Utc::now()));
                active.sync_attempts = Set(attempts);
                active.update(db).await?;
            }
        }

        Ok((fingerprints, devices_to_remove))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{NewTemplate, TemplateStore};
    use crate::test_support::{
        seed_offline_device, seed_student, state_for, sync_for,
    };
    use db::models::device;
    use db::test_utils::setup_test_db;

    fn request(device_id: &str) -> SyncRequest {
        SyncRequest {
            device_id: device_id.into(),
            current_fingerprints: None,
            firmware_version: Some("2.1.0".into()),
            current_address: Some("10.0.0.7".into()),
            last_sync: None,
            offline_events: Vec::new(),
        }
    }

    async fn enroll(state: &util::state::AppState, user_id: i64, payload: &str) {
        TemplateStore::enroll(
            state,
            NewTemplate {
                user_id,
                payload: payload.into(),
                quality: 85,
                origin_device: None,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn first_sync_registers_and_returns_empty_set() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let (coordinator, _audit) = sync_for(&db);

        let response = coordinator
            .handle_sync_request(&state, request("esp32-new"))
            .await
            .unwrap();

        assert!(response.success);
        assert!(response.fingerprints.is_empty());
        assert!(response.devices_to_remove.is_empty());

        let device = DeviceRegistry::get(&db, "esp32-new").await.unwrap();
        assert_eq!(device.state, db::models::device::DeviceState::Online);
    }

    #[tokio::test]
    async fn sync_delivers_pending_templates_and_is_idempotent() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let (coordinator, _audit) = sync_for(&db);

        // device registers through its first sync
        coordinator
            .handle_sync_request(&state, request("esp32-a"))
            .await
            .unwrap();

        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        enroll(&state, user.id, "FP_A").await;

        let response = coordinator
            .handle_sync_request(&state, request("esp32-a"))
            .await
            .unwrap();
        assert_eq!(response.fingerprints.len(), 1);
        assert_eq!(response.fingerprints[0].slot_recommendation, 1);
        assert_eq!(response.fingerprints[0].name, "Ana Paz");
        assert_eq!(response.fingerprints[0].dni, "30111222");
        assert_eq!(response.fingerprints[0].template, "FP_A");

        let again = coordinator
            .handle_sync_request(&state, request("esp32-a"))
            .await
            .unwrap();
        assert_eq!(again.fingerprints.len(), 1);
        assert_eq!(again.fingerprints[0].slot_recommendation, 1);
        assert!(again.devices_to_remove.is_empty());

        let assignment = device_slot_assignment::Entity::find()
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Synced);
        assert_eq!(assignment.sync_attempts, 1);
    }

    #[tokio::test]
    async fn deleted_templates_are_erased_on_next_sync() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let (coordinator, _audit) = sync_for(&db);

        coordinator
            .handle_sync_request(&state, request("esp32-a"))
            .await
            .unwrap();
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        enroll(&state, user.id, "FP_A").await;
        coordinator
            .handle_sync_request(&state, request("esp32-a"))
            .await
            .unwrap();

        let template = fingerprint_template::Entity::find()
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        TemplateStore::delete(&state, template.id).await.unwrap();

        let response = coordinator
            .handle_sync_request(&state, request("esp32-a"))
            .await
            .unwrap();
        assert!(response.fingerprints.is_empty());
        assert_eq!(response.devices_to_remove, vec![user.id]);

        // the erase is confirmed exactly once
        let again = coordinator
            .handle_sync_request(&state, request("esp32-a"))
            .await
            .unwrap();
        assert!(again.devices_to_remove.is_empty());
    }

    #[tokio::test]
    async fn reconnect_sync_replays_queued_work_in_the_same_handshake() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let (coordinator, _audit) = sync_for(&db);

        seed_offline_device(&db, "esp32-away", 127).await;
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        enroll(&state, user.id, "FP_A").await;

        let response = coordinator
            .handle_sync_request(&state, request("esp32-away"))
            .await
            .unwrap();

        assert_eq!(response.replay.processed, 1);
        assert_eq!(response.fingerprints.len(), 1);
        assert_eq!(response.fingerprints[0].template, "FP_A");

        let dev = device::Entity::find_by_id("esp32-away")
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dev.state, db::models::device::DeviceState::Online);
    }
}

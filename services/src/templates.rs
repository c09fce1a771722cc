//! Fingerprint template store and fleet-wide distribution.
//!
//! Templates live centrally and are pushed onto each sensor's local slot
//! memory as `device_slot_assignment` rows. Distribution is best effort: a
//! full or failing device leaves the enrollment valid and is reported back
//! in `unresolved_devices` instead of failing the whole operation.

use chrono::Utc;
use db::models::device::{self, DeviceState};
use db::models::device_slot_assignment::{self, AssignmentStatus};
use db::models::{fingerprint_template, user};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use util::state::AppState;

use crate::devices::DeviceRegistry;
use crate::error::{ServiceError, ServiceResult};
use crate::offline::OfflineEventQueue;
use crate::slots::SlotAllocator;

#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
    pub user_id: i64,
    pub payload: String,
    pub quality: i32,
    pub origin_device: Option<String>,
}

/// A device the distribution pass could not place the template on, with the
/// reason it was skipped.
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedDevice {
    pub device_id: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollOutcome {
    pub template: fingerprint_template::Model,
    /// Devices that now hold a pending or queued copy of the template.
    pub distributed_devices: Vec<String>,
    pub unresolved_devices: Vec<UnresolvedDevice>,
}

pub struct TemplateStore;

impl TemplateStore {
    /// Content hash used for duplicate detection across re-enrollments.
    pub fn template_hash(user_id: i64, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{user_id}_{payload}").as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Stores a new template and distributes it to every reachable device.
    ///
    /// A user holds at most one active template; enrolling while one exists
    /// is a conflict and the old template must be deleted first. Offline
    /// devices get an enroll operation queued for replay on their next sync
    /// instead of an immediate assignment. Devices in the error state are
    /// skipped entirely and reported as unresolved.
    pub async fn enroll(state: &AppState, new: NewTemplate) -> ServiceResult<EnrollOutcome> {
        if new.payload.trim().is_empty() {
            return Err(ServiceError::validation("template payload must not be empty"));
        }
        if !(0..=100).contains(&new.quality) {
            return Err(ServiceError::validation(
                "template quality must be between 0 and 100",
            ));
        }

        let db = state.db();
        if user::Entity::find_by_id(new.user_id).one(db).await?.is_none() {
            return Err(ServiceError::not_found(format!(
                "user {} not found",
                new.user_id
            )));
        }

        let hash = Self::template_hash(new.user_id, &new.payload);
        if let Some(existing) = fingerprint_template::Entity::find()
            .filter(fingerprint_template::Column::UserId.eq(new.user_id))
            .filter(fingerprint_template::Column::Active.eq(true))
            .one(db)
            .await?
        {
            let detail = if existing.template_hash == hash {
                "this exact template is already enrolled"
            } else {
                "delete the current template before enrolling a new one"
            };
            return Err(ServiceError::conflict(format!(
                "user {} already has an active template: {detail}",
                new.user_id
            )));
        }

        let template = fingerprint_template::ActiveModel {
            id: NotSet,
            user_id: Set(new.user_id),
            payload: Set(new.payload),
            quality: Set(new.quality),
            template_hash: Set(hash),
            origin_device: Set(new.origin_device),
            active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await?;

        let mut distributed = Vec::new();
        let mut unresolved = Vec::new();

        for target in DeviceRegistry::fleet(db).await? {
            match Self::distribute_to_device(state, &template, &target).await {
                Ok(()) => distributed.push(target.id),
                Err(err) => {
                    warn!(
                        device = %target.id,
                        template = template.id,
                        error = %err,
                        "template distribution skipped device"
                    );
                    unresolved.push(UnresolvedDevice {
                        device_id: target.id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            template = template.id,
            user = template.user_id,
            distributed = distributed.len(),
            unresolved = unresolved.len(),
            "template enrolled"
        );

        Ok(EnrollOutcome {
            template,
            distributed_devices: distributed,
            unresolved_devices: unresolved,
        })
    }

    async fn distribute_to_device(
        state: &AppState,
        template: &fingerprint_template::Model,
        target: &device::Model,
    ) -> ServiceResult<()> {
        match target.state {
            DeviceState::Error => Err(ServiceError::sync(format!(
                "device {} is in the error state",
                target.id
            ))),
            DeviceState::Offline => {
                OfflineEventQueue::enqueue_enroll(state.db(), &target.id, template.id).await?;
                Ok(())
            }
            _ => Self::assign_to_device(state, template.id, &target.id)
                .await
                .map(|_| ()),
        }
    }

    /// Allocates a slot on the device and records a pending assignment.
    /// Idempotent: an existing live assignment for the pair is returned as is.
    pub async fn assign_to_device(
        state: &AppState,
        template_id: i64,
        device_id: &str,
    ) -> ServiceResult<device_slot_assignment::Model> {
        let lock = state.device_lock(device_id);
        let _guard = lock.lock().await;

        let db = state.db();
        let device = DeviceRegistry::get(db, device_id).await?;

        if let Some(existing) = device_slot_assignment::Entity::find()
            .filter(device_slot_assignment::Column::TemplateId.eq(template_id))
            .filter(device_slot_assignment::Column::DeviceId.eq(device_id))
            .filter(device_slot_assignment::Column::Status.ne(AssignmentStatus::Removed))
            .one(db)
            .await?
        {
            return Ok(existing);
        }

        let slot = SlotAllocator::find_available_slot(db, &device).await?;
        let assignment = device_slot_assignment::ActiveModel {
            id: NotSet,
            template_id: Set(template_id),
            device_id: Set(device_id.to_owned()),
            local_slot: Set(slot),
            status: Set(AssignmentStatus::Pending),
            last_synced_at: Set(None),
            sync_attempts: Set(0),
        }
        .insert(db)
        .await?;
        Ok(assignment)
    }

    /// Deactivates a template and schedules its removal from every device
    /// that still holds it. Pending copies that never reached a device are
    /// removed outright.
    pub async fn delete(state: &AppState, template_id: i64) -> ServiceResult<()> {
        let db = state.db();
        let template = fingerprint_template::Entity::find_by_id(template_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("template {template_id} not found")))?;

        let mut active: fingerprint_template::ActiveModel = template.into();
        active.active = Set(false);
        active.update(db).await?;

        let assignments = device_slot_assignment::Entity::find()
            .filter(device_slot_assignment::Column::TemplateId.eq(template_id))
            .filter(device_slot_assignment::Column::Status.ne(AssignmentStatus::Removed))
            .all(db)
            .await?;

        for assignment in assignments {
            let device_id = assignment.device_id.clone();
            let lock = state.device_lock(&device_id);
            let _guard = lock.lock().await;

            let next = match assignment.status {
                // never reached the sensor, nothing to erase remotely
                AssignmentStatus::Pending => AssignmentStatus::Removed,
                _ => AssignmentStatus::RemovalPending,
            };
            let mut am: device_slot_assignment::ActiveModel = assignment.into();
            am.status = Set(next);
            am.update(db).await?;
        }

        info!(template = template_id, "template deactivated");
        Ok(())
    }

    /// Deactivates every active template a user owns.
    pub async fn delete_for_user(state: &AppState, user_id: i64) -> ServiceResult<u64> {
        let templates = fingerprint_template::Entity::find()
            .filter(fingerprint_template::Column::UserId.eq(user_id))
            .filter(fingerprint_template::Column::Active.eq(true))
            .all(state.db())
            .await?;

        let count = templates.len() as u64;
        for template in templates {
            Self::delete(state, template.id).await?;
        }
        Ok(count)
    }

    /// Resolves a raw sensor payload to its owner by exact match against the
    /// active templates.
    pub async fn identify(
        db: &DatabaseConnection,
        payload: &str,
    ) -> ServiceResult<Option<fingerprint_template::Model>> {
        Ok(fingerprint_template::Entity::find()
            .filter(fingerprint_template::Column::Payload.eq(payload))
            .filter(fingerprint_template::Column::Active.eq(true))
            .one(db)
            .await?)
    }

    pub async fn list_for_user(
        db: &DatabaseConnection,
        user_id: i64,
    ) -> ServiceResult<Vec<fingerprint_template::Model>> {
        Ok(fingerprint_template::Entity::find()
            .filter(fingerprint_template::Column::UserId.eq(user_id))
            .filter(fingerprint_template::Column::Active.eq(true))
            .order_by_asc(fingerprint_template::Column::Id)
            .all(db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_device, seed_offline_device, seed_student, state_for};
    use db::models::offline_event::{self, OperationType};
    use db::test_utils::setup_test_db;

    fn new_template(user_id: i64, payload: &str) -> NewTemplate {
        NewTemplate {
            user_id,
            payload: payload.into(),
            quality: 80,
            origin_device: None,
        }
    }

    #[tokio::test]
    async fn enroll_distributes_to_online_devices() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        seed_device(&db, "esp32-a", 127).await;
        seed_device(&db, "esp32-b", 127).await;

        let outcome = TemplateStore::enroll(&state, new_template(user.id, "FP_A"))
            .await
            .unwrap();

        assert_eq!(outcome.distributed_devices.len(), 2);
        assert!(outcome.unresolved_devices.is_empty());

        let assignments = device_slot_assignment::Entity::find()
            .filter(device_slot_assignment::Column::TemplateId.eq(outcome.template.id))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(assignments.len(), 2);
        assert!(assignments
            .iter()
            .all(|a| a.status == AssignmentStatus::Pending && a.local_slot == 1));
    }

    #[tokio::test]
    async fn enroll_queues_for_offline_devices() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        seed_offline_device(&db, "esp32-away", 127).await;

        let outcome = TemplateStore::enroll(&state, new_template(user.id, "FP_A"))
            .await
            .unwrap();
        assert_eq!(outcome.distributed_devices, vec!["esp32-away".to_string()]);

        let queued = offline_event::Entity::find()
            .filter(offline_event::Column::DeviceId.eq("esp32-away"))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].operation_type, OperationType::Enroll);
    }

    #[tokio::test]
    async fn error_state_device_is_listed_as_unresolved() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        seed_device(&db, "esp32-ok", 127).await;
        seed_device(&db, "esp32-parked", 127).await;
        DeviceRegistry::update_status(&db, "esp32-parked", DeviceState::Error, None)
            .await
            .unwrap();

        let outcome = TemplateStore::enroll(&state, new_template(user.id, "FP_A"))
            .await
            .unwrap();

        assert_eq!(outcome.distributed_devices, vec!["esp32-ok".to_string()]);
        assert_eq!(outcome.unresolved_devices.len(), 1);
        assert_eq!(outcome.unresolved_devices[0].device_id, "esp32-parked");
        assert!(outcome.unresolved_devices[0].reason.contains("error state"));

        // nothing was assigned to or queued for the parked device
        let assignments = device_slot_assignment::Entity::find()
            .filter(device_slot_assignment::Column::DeviceId.eq("esp32-parked"))
            .all(&db)
            .await
            .unwrap();
        assert!(assignments.is_empty());
    }

    #[tokio::test]
    async fn full_device_is_reported_not_fatal() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        let other = seed_student(&db, "30999888", "Bruno", "Sol").await;
        seed_device(&db, "esp32-tiny", 1).await;

        TemplateStore::enroll(&state, new_template(user.id, "FP_A"))
            .await
            .unwrap();
        let outcome = TemplateStore::enroll(&state, new_template(other.id, "FP_B"))
            .await
            .unwrap();

        assert!(outcome.distributed_devices.is_empty());
        assert_eq!(outcome.unresolved_devices.len(), 1);
        assert_eq!(outcome.unresolved_devices[0].device_id, "esp32-tiny");
        // the template itself was stored regardless
        assert!(TemplateStore::identify(&db, "FP_B").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_enrollment_for_a_user_is_a_conflict() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;

        TemplateStore::enroll(&state, new_template(user.id, "FP_A"))
            .await
            .unwrap();
        // the same payload again
        let err = TemplateStore::enroll(&state, new_template(user.id, "FP_A"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        // a different finger without deleting first
        let err = TemplateStore::enroll(&state, new_template(user.id, "FP_B"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn enrolling_an_unknown_user_is_not_found() {
        let db = setup_test_db().await;
        let state = state_for(&db);

        let err = TemplateStore::enroll(&state, new_template(999, "FP_A"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_allows_re_enrollment() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;

        let first = TemplateStore::enroll(&state, new_template(user.id, "FP_A"))
            .await
            .unwrap();
        TemplateStore::delete(&state, first.template.id).await.unwrap();

        let second = TemplateStore::enroll(&state, new_template(user.id, "FP_B"))
            .await
            .unwrap();
        assert_ne!(first.template.id, second.template.id);
        assert!(TemplateStore::identify(&db, "FP_B").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_marks_synced_copies_for_removal() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        seed_device(&db, "esp32-a", 127).await;

        let outcome = TemplateStore::enroll(&state, new_template(user.id, "FP_A"))
            .await
            .unwrap();

        // simulate a completed sync
        let assignment = device_slot_assignment::Entity::find()
            .filter(device_slot_assignment::Column::TemplateId.eq(outcome.template.id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        let mut am: device_slot_assignment::ActiveModel = assignment.into();
        am.status = Set(AssignmentStatus::Synced);
        am.update(&db).await.unwrap();

        TemplateStore::delete(&state, outcome.template.id).await.unwrap();

        let after = device_slot_assignment::Entity::find()
            .filter(device_slot_assignment::Column::TemplateId.eq(outcome.template.id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, AssignmentStatus::RemovalPending);
        assert!(TemplateStore::identify(&db, "FP_A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_of_pending_copy_skips_the_device() {
        let db = setup_test_db().await;
        let state = state_for(&db);
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        let device = seed_device(&db, "esp32-a", 127).await;

        let outcome = TemplateStore::enroll(&state, new_template(user.id, "FP_A"))
            .await
            .unwrap();
        TemplateStore::delete(&state, outcome.template.id).await.unwrap();

        let after = device_slot_assignment::Entity::find()
            .filter(device_slot_assignment::Column::TemplateId.eq(outcome.template.id))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, AssignmentStatus::Removed);

        // the freed slot is immediately reusable
        let slot = SlotAllocator::find_available_slot(&db, &device).await.unwrap();
        assert_eq!(slot, 1);
    }

    #[tokio::test]
    async fn hash_is_stable_and_user_scoped() {
        let a = TemplateStore::template_hash(1, "FP_A");
        let b = TemplateStore::template_hash(1, "FP_A");
        let c = TemplateStore::template_hash(2, "FP_A");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}

//! Slot allocation for fingerprint sensors with fixed-size local template
//! memory. Slots are numbered from 1; slot 0 is reserved by the sensor
//! firmware for capture buffers and is never handed out.

use db::models::device;
use db::models::device_slot_assignment::{self, AssignmentStatus};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashSet;

use crate::error::{ServiceError, ServiceResult};

pub struct SlotAllocator;

impl SlotAllocator {
    /// Finds the smallest free slot in `1..=capacity` for the given device.
    ///
    /// A slot counts as occupied while any assignment in `pending`, `synced`
    /// or `removal_pending` status points at it. Slots whose assignments have
    /// reached `removed` are reusable again.
    ///
    /// Callers must hold the device lock from `AppState::device_lock` so two
    /// concurrent enrollments cannot be handed the same slot.
    pub async fn find_available_slot(
        db: &DatabaseConnection,
        device: &device::Model,
    ) -> ServiceResult<i32> {
        if device.capacity < 1 {
            return Err(ServiceError::conflict(format!(
                "device {} reports no usable slot capacity",
                device.id
            )));
        }

        let assignments = device_slot_assignment::Entity::find()
            .filter(device_slot_assignment::Column::DeviceId.eq(device.id.clone()))
            .filter(device_slot_assignment::Column::Status.ne(AssignmentStatus::Removed))
            .all(db)
            .await?;

        let occupied: HashSet<i32> = assignments.iter().map(|a| a.local_slot).collect();

        (1..=device.capacity)
            .find(|slot| !occupied.contains(slot))
            .ok_or_else(|| {
                ServiceError::conflict(format!(
                    "device {} is full ({} slots occupied)",
                    device.id, device.capacity
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_assignment, seed_device, seed_student, seed_template};
    use db::test_utils::setup_test_db;

    #[tokio::test]
    async fn allocates_smallest_free_slot() {
        let db = setup_test_db().await;
        let device = seed_device(&db, "esp32-a", 127).await;
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        let t1 = seed_template(&db, user.id, "payload-1").await;
        let t2 = seed_template(&db, user.id, "payload-2").await;

        seed_assignment(&db, t1.id, &device.id, 1, AssignmentStatus::Synced).await;
        seed_assignment(&db, t2.id, &device.id, 3, AssignmentStatus::Pending).await;

        let slot = SlotAllocator::find_available_slot(&db, &device).await.unwrap();
        assert_eq!(slot, 2);
    }

    #[tokio::test]
    async fn removed_assignments_free_their_slot() {
        let db = setup_test_db().await;
        let device = seed_device(&db, "esp32-a", 2).await;
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        let t1 = seed_template(&db, user.id, "payload-1").await;
        let t2 = seed_template(&db, user.id, "payload-2").await;

        seed_assignment(&db, t1.id, &device.id, 1, AssignmentStatus::Removed).await;
        seed_assignment(&db, t2.id, &device.id, 2, AssignmentStatus::RemovalPending).await;

        // slot 2 still held until the device confirms the removal
        let slot = SlotAllocator::find_available_slot(&db, &device).await.unwrap();
        assert_eq!(slot, 1);
    }

    #[tokio::test]
    async fn full_device_is_a_conflict() {
        let db = setup_test_db().await;
        let device = seed_device(&db, "esp32-tiny", 2).await;
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;
        for slot in 1..=2 {
            let t = seed_template(&db, user.id, &format!("payload-{slot}")).await;
            seed_assignment(&db, t.id, &device.id, slot, AssignmentStatus::Synced).await;
        }

        let err = SlotAllocator::find_available_slot(&db, &device)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}

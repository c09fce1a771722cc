//! Append-only recorder for everything the sensors report: authentications,
//! enrollment confirmations, heartbeats and errors. Rows are never updated
//! or deleted; corrections happen downstream in the attendance layer.

use chrono::{DateTime, Utc};
use db::models::biometric_event::{self, EventResult, EventType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tracing::warn;

use crate::collab::AuditLog;
use crate::error::ServiceResult;
use db::models::audit_log::AuditScope;

#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub device_id: String,
    pub user_id: Option<i64>,
    pub event_type: EventType,
    pub result: EventResult,
    pub confidence: Option<i32>,
    pub device_timestamp: Option<DateTime<Utc>>,
}

pub struct EventRecorder;

impl EventRecorder {
    /// Persists one event. Failed authentications with no resolved user are
    /// flagged and mirrored into the security audit trail.
    pub async fn record(
        db: &DatabaseConnection,
        audit: &dyn AuditLog,
        event: RecordedEvent,
    ) -> ServiceResult<biometric_event::Model> {
        let security_flagged = event.event_type == EventType::Auth
            && event.result == EventResult::Failure
            && event.user_id.is_none();

        let stored = biometric_event::ActiveModel {
            id: NotSet,
            device_id: Set(event.device_id.clone()),
            user_id: Set(event.user_id),
            event_type: Set(event.event_type),
            result: Set(event.result),
            confidence: Set(event.confidence),
            security_flagged: Set(security_flagged),
            device_timestamp: Set(event.device_timestamp),
            server_timestamp: Set(Utc::now()),
        }
        .insert(db)
        .await?;

        if security_flagged {
            warn!(device = %stored.device_id, "unrecognized fingerprint rejected");
            audit
                .append(
                    AuditScope::Security,
                    &format!(
                        "unrecognized fingerprint rejected at device {}",
                        stored.device_id
                    ),
                    Some(&stored.device_id),
                    None,
                )
                .await?;
        }

        Ok(stored)
    }

    pub async fn list_for_device(
        db: &DatabaseConnection,
        device_id: &str,
        limit: u64,
    ) -> ServiceResult<Vec<biometric_event::Model>> {
        Ok(biometric_event::Entity::find()
            .filter(biometric_event::Column::DeviceId.eq(device_id))
            .order_by_desc(biometric_event::Column::ServerTimestamp)
            .limit(limit)
            .all(db)
            .await?)
    }

    pub async fn list_flagged(
        db: &DatabaseConnection,
        limit: u64,
    ) -> ServiceResult<Vec<biometric_event::Model>> {
        Ok(biometric_event::Entity::find()
            .filter(biometric_event::Column::SecurityFlagged.eq(true))
            .order_by_desc(biometric_event::Column::ServerTimestamp)
            .limit(limit)
            .all(db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_device, seed_student, CapturingAudit};
    use db::test_utils::setup_test_db;

    #[tokio::test]
    async fn successful_auth_is_not_flagged() {
        let db = setup_test_db().await;
        let audit = CapturingAudit::default();
        let device = seed_device(&db, "esp32-a", 127).await;
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;

        let stored = EventRecorder::record(
            &db,
            &audit,
            RecordedEvent {
                device_id: device.id,
                user_id: Some(user.id),
                event_type: EventType::Auth,
                result: EventResult::Success,
                confidence: Some(93),
                device_timestamp: None,
            },
        )
        .await
        .unwrap();

        assert!(!stored.security_flagged);
        assert!(audit.entries().is_empty());
    }

    #[tokio::test]
    async fn unresolved_failed_auth_is_flagged_and_audited() {
        let db = setup_test_db().await;
        let audit = CapturingAudit::default();
        let device = seed_device(&db, "esp32-a", 127).await;

        let stored = EventRecorder::record(
            &db,
            &audit,
            RecordedEvent {
                device_id: device.id,
                user_id: None,
                event_type: EventType::Auth,
                result: EventResult::Failure,
                confidence: Some(41),
                device_timestamp: None,
            },
        )
        .await
        .unwrap();

        assert!(stored.security_flagged);
        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].scope, AuditScope::Security);

        let flagged = EventRecorder::list_flagged(&db, 10).await.unwrap();
        assert_eq!(flagged.len(), 1);
    }

    #[tokio::test]
    async fn failed_auth_with_known_user_is_not_flagged() {
        let db = setup_test_db().await;
        let audit = CapturingAudit::default();
        let device = seed_device(&db, "esp32-a", 127).await;
        let user = seed_student(&db, "30111222", "Ana", "Paz").await;

        let stored = EventRecorder::record(
            &db,
            &audit,
            RecordedEvent {
                device_id: device.id,
                user_id: Some(user.id),
                event_type: EventType::Auth,
                result: EventResult::Failure,
                confidence: Some(20),
                device_timestamp: None,
            },
        )
        .await
        .unwrap();

        assert!(!stored.security_flagged);
    }
}

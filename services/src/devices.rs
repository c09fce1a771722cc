//! Device registry: identity, connectivity state and capacity of the fleet.

use chrono::{Duration, Utc};
use db::models::device::{self, DeviceState};
use db::models::device_slot_assignment::{self, AssignmentStatus};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use util::config::AppConfig;

use crate::error::{ServiceError, ServiceResult};

/// Admin-side registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDevice {
    pub id: String,
    pub name: String,
    pub location: String,
    pub current_address: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub capacity: Option<i32>,
}

/// Dashboard row: device plus its slot occupancy.
#[derive(Debug, Serialize)]
pub struct DeviceOverview {
    pub device: device::Model,
    pub synced_count: u64,
    pub pending_count: u64,
    pub removal_pending_count: u64,
}

pub struct DeviceRegistry;

impl DeviceRegistry {
    /// Creates or refreshes a device row. Existing rows keep their capacity;
    /// name, location, address and firmware are overwritten by the caller's
    /// values, matching how devices re-announce themselves.
    pub async fn register(db: &DatabaseConnection, new: NewDevice) -> ServiceResult<device::Model> {
        if new.id.trim().is_empty() {
            return Err(ServiceError::validation("device id must not be empty"));
        }

        let now = Utc::now();
        match device::Entity::find_by_id(&new.id).one(db).await? {
            Some(existing) => {
                let mut active: device::ActiveModel = existing.into();
                active.name = Set(new.name);
                active.location = Set(new.location);
                if new.current_address.is_some() {
                    active.current_address = Set(new.current_address);
                }
                if new.firmware_version.is_some() {
                    active.firmware_version = Set(new.firmware_version);
                }
                active.last_contact = Set(now);
                active.updated_at = Set(now);
                Ok(active.update(db).await?)
            }
            None => {
                let capacity = new
                    .capacity
                    .unwrap_or_else(|| AppConfig::global().device_capacity);
                let created = device::ActiveModel {
                    id: Set(new.id.clone()),
                    name: Set(new.name),
                    location: Set(new.location),
                    current_address: Set(new.current_address),
                    state: Set(DeviceState::Online),
                    model: Set(new.model.or_else(|| Some("AS608".into()))),
                    firmware_version: Set(new.firmware_version),
                    capacity: Set(capacity),
                    last_contact: Set(now),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(db)
                .await?;
                info!(device = %created.id, "registered new biometric device");
                Ok(created)
            }
        }
    }

    /// Registers an unknown device from a sync handshake, or refreshes the
    /// contact data of a known one. Handshakes carry no name or location, so
    /// defaults are derived from the device id until an admin renames it.
    pub async fn ensure_for_handshake(
        db: &DatabaseConnection,
        device_id: &str,
        firmware_version: Option<&str>,
        address: Option<&str>,
    ) -> ServiceResult<device::Model> {
        match device::Entity::find_by_id(device_id).one(db).await? {
            Some(existing) => {
                let now = Utc::now();
                let mut active: device::ActiveModel = existing.into();
                if let Some(fw) = firmware_version {
                    active.firmware_version = Set(Some(fw.to_owned()));
                }
                if let Some(addr) = address {
                    active.current_address = Set(Some(addr.to_owned()));
                }
                active.last_contact = Set(now);
                active.updated_at = Set(now);
                Ok(active.update(db).await?)
            }
            None => {
                Self::register(
                    db,
                    NewDevice {
                        id: device_id.to_owned(),
                        name: device_id.to_owned(),
                        location: "unassigned".into(),
                        current_address: address.map(str::to_owned),
                        model: None,
                        firmware_version: firmware_version.map(str::to_owned),
                        capacity: None,
                    },
                )
                .await
            }
        }
    }

    pub async fn update_status(
        db: &DatabaseConnection,
        device_id: &str,
        state: DeviceState,
        address: Option<&str>,
    ) -> ServiceResult<device::Model> {
        let device = Self::get(db, device_id).await?;
        let now = Utc::now();
        let mut active: device::ActiveModel = device.into();
        active.state = Set(state);
        if let Some(addr) = address {
            active.current_address = Set(Some(addr.to_owned()));
        }
        active.last_contact = Set(now);
        active.updated_at = Set(now);
        Ok(active.update(db).await?)
    }

    pub async fn find(
        db: &DatabaseConnection,
        device_id: &str,
    ) -> ServiceResult<Option<device::Model>> {
        Ok(device::Entity::find_by_id(device_id).one(db).await?)
    }

    pub async fn get(db: &DatabaseConnection, device_id: &str) -> ServiceResult<device::Model> {
        Self::find(db, device_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("device {device_id} is not registered")))
    }

    /// The whole registered fleet, ordered by id. Enrollment distribution
    /// walks this and decides per device what to do with its state.
    pub async fn fleet(db: &DatabaseConnection) -> ServiceResult<Vec<device::Model>> {
        Ok(device::Entity::find()
            .order_by_asc(device::Column::Id)
            .all(db)
            .await?)
    }

    pub async fn list(db: &DatabaseConnection) -> ServiceResult<Vec<DeviceOverview>> {
        let devices = device::Entity::find()
            .order_by_desc(device::Column::LastContact)
            .all(db)
            .await?;

        let mut overviews = Vec::with_capacity(devices.len());
        for dev in devices {
            let count_with = |status: AssignmentStatus| {
                device_slot_assignment::Entity::find()
                    .filter(device_slot_assignment::Column::DeviceId.eq(dev.id.clone()))
                    .filter(device_slot_assignment::Column::Status.eq(status))
                    .count(db)
            };
            let synced_count = count_with(AssignmentStatus::Synced).await?;
            let pending_count = count_with(AssignmentStatus::Pending).await?;
            let removal_pending_count = count_with(AssignmentStatus::RemovalPending).await?;
            overviews.push(DeviceOverview {
                device: dev,
                synced_count,
                pending_count,
                removal_pending_count,
            });
        }
        Ok(overviews)
    }

    /// Liveness sweep: online devices whose last contact is older than the
    /// configured threshold become offline. Returns how many flipped.
    pub async fn sweep_stale(db: &DatabaseConnection) -> ServiceResult<u64> {
        let cutoff =
            Utc::now() - Duration::seconds(AppConfig::global().device_offline_after_seconds);

        let stale = device::Entity::find()
            .filter(device::Column::State.eq(DeviceState::Online))
            .filter(device::Column::LastContact.lt(cutoff))
            .all(db)
            .await?;

        let mut flipped = 0;
        for dev in stale {
            let id = dev.id.clone();
            let mut active: device::ActiveModel = dev.into();
            active.state = Set(DeviceState::Offline);
            active.updated_at = Set(Utc::now());
            active.update(db).await?;
            info!(device = %id, "liveness sweep marked device offline");
            flipped += 1;
        }
        Ok(flipped)
    }

    pub async fn remove(db: &DatabaseConnection, device_id: &str) -> ServiceResult<()> {
        let device = Self::get(db, device_id).await?;
        device::Entity::delete_by_id(device.id).exec(db).await?;
        Ok(())
    }
}

//! Application state container shared across Axum route handlers and services.
//!
//! Holds the database connection plus the keyed mutual-exclusion maps the
//! sync and derivation pipelines rely on. Wrapped in clones and passed into
//! route handlers via Axum's `State<T>` extractor.

use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type KeyedLocks<K> = Arc<Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>>;

/// Central application state shared across the server.
///
/// Besides the SeaORM connection, this carries three lock registries:
/// - one mutex per device id, serializing everything that mutates a single
///   device's slot assignments (sync handshakes, slot allocation);
/// - one replay mutex per device id, keeping offline-event replay in enqueue
///   order. This is separate from the assignment lock because a replayed
///   enroll acquires assignment locks across the fleet, including its own
///   device's;
/// - one mutex per (user, date), so two attendance recomputations for the
///   same student-day never race on the upsert.
///
/// Distinct keys proceed independently and in parallel.
#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    device_locks: KeyedLocks<String>,
    replay_locks: KeyedLocks<String>,
    derivation_locks: KeyedLocks<(i64, NaiveDate)>,
}

impl AppState {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            device_locks: Arc::new(Mutex::new(HashMap::new())),
            replay_locks: Arc::new(Mutex::new(HashMap::new())),
            derivation_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns a shared reference to the internal `DatabaseConnection`.
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Returns a cloned copy of the database connection.
    ///
    /// Useful for async contexts or spawning tasks that require ownership.
    pub fn db_clone(&self) -> DatabaseConnection {
        self.db.clone()
    }

    /// Returns the serialization mutex for one device id.
    ///
    /// The returned Arc must be locked by the caller; holding it guarantees
    /// no other task is touching this device's assignments.
    pub fn device_lock(&self, device_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.device_locks.lock().expect("device lock map poisoned");
        map.entry(device_id.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Returns the replay-ordering mutex for one device id.
    pub fn replay_lock(&self, device_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.replay_locks.lock().expect("replay lock map poisoned");
        map.entry(device_id.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Returns the serialization mutex for one (user, date) derivation key.
    pub fn derivation_lock(&self, user_id: i64, date: NaiveDate) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self
            .derivation_locks
            .lock()
            .expect("derivation lock map poisoned");
        map.entry((user_id, date))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{Database, DatabaseConnection};

    async fn dummy_db() -> DatabaseConnection {
        Database::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn same_device_returns_same_mutex() {
        let state = AppState::new(dummy_db().await);
        let a = state.device_lock("esp32-01");
        let b = state.device_lock("esp32-01");
        assert!(Arc::ptr_eq(&a, &b));

        let other = state.device_lock("esp32-02");
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn derivation_keys_are_independent() {
        let state = AppState::new(dummy_db().await);
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let a = state.derivation_lock(1, date);
        let b = state.derivation_lock(1, date);
        let c = state.derivation_lock(2, date);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}

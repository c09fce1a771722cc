//! Domain services for the distributed biometric attendance core.
//!
//! Everything here is storage-backed through the `db` entities and keeps the
//! concurrency contract documented on `util::state::AppState`: per-device
//! serialization for slot mutation and replay, per-(user, date)
//! serialization for attendance recomputation.

pub mod attendance;
pub mod checkin;
pub mod collab;
pub mod devices;
pub mod error;
pub mod events;
pub mod offline;
pub mod slots;
pub mod sync;
pub mod templates;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ServiceError, ServiceResult};

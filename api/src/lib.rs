//! HTTP surface of the attendance core.
//!
//! Two kinds of endpoint live here: admin endpoints wrapped in the standard
//! `ApiResponse` envelope, and device-facing endpoints (`/sync`,
//! `/biometric-record`) that speak the raw JSON shapes the firmware parses.

pub mod response;
pub mod routes;

#[cfg(test)]
mod tests;

//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables. It provides
//! thread-safe access and mutation for testing or overrides in runtime environments.

use chrono::NaiveTime;
use std::env;
use std::sync::{OnceLock, RwLock};

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub database_path: String,
    pub host: String,
    pub port: u16,
    /// Default fingerprint slot capacity for newly registered devices.
    pub device_capacity: i32,
    /// Upper bound on one sync handshake before the device is marked errored.
    pub sync_timeout_seconds: u64,
    /// Replay attempts before an offline event is marked permanently failed.
    pub offline_max_retries: i32,
    /// Minutes after a session start before a check-in counts as late.
    pub late_grace_minutes: i64,
    /// Midday window scanned for lunch-out / lunch-in pairs.
    pub lunch_window_start: NaiveTime,
    pub lunch_window_end: NaiveTime,
    /// Seconds without contact before the liveness sweep marks a device offline.
    pub device_offline_after_seconds: i64,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_time_or(key: &str, default: &str) -> NaiveTime {
    let raw = env::var(key).unwrap_or_else(|_| default.into());
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .unwrap_or_else(|_| panic!("{key} must be HH:MM or HH:MM:SS, got {raw}"))
}

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// This method is used internally to populate the singleton. It panics
    /// if required variables are missing or improperly formatted.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "attendance-api".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "api=info".into()),
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "api.log".into()),
            log_to_stdout: env::var("LOG_TO_STDOUT").unwrap_or_else(|_| "false".into()) == "true",
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "data/attendance.db".into()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env_or("PORT", 3000),
            device_capacity: env_or("DEVICE_CAPACITY", 127),
            sync_timeout_seconds: env_or("SYNC_TIMEOUT_SECONDS", 30),
            offline_max_retries: env_or("OFFLINE_MAX_RETRIES", 3),
            late_grace_minutes: env_or("LATE_GRACE_MINUTES", 15),
            lunch_window_start: env_time_or("LUNCH_WINDOW_START", "12:00"),
            lunch_window_end: env_time_or("LUNCH_WINDOW_END", "14:00"),
            device_offline_after_seconds: env_or("DEVICE_OFFLINE_AFTER_SECONDS", 300),
        }
    }

    /// Returns a shared reference to the global configuration.
    ///
    /// # Panics
    /// Panics if the lock cannot be acquired.
    pub fn global() -> std::sync::RwLockReadGuard<'static, AppConfig> {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            let mut guard = lock.write().unwrap();
            *guard = AppConfig::from_env();
        }
    }

    /// Generic internal setter for any field in the config.
    ///
    /// Used by public per-field setter methods.
    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_env(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.env = value.into());
    }

    pub fn set_project_name(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.project_name = value.into());
    }

    pub fn set_log_level(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_level = value.into());
    }

    pub fn set_log_file(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_file = value.into());
    }

    pub fn set_log_to_stdout(value: bool) {
        AppConfig::set_field(|cfg| cfg.log_to_stdout = value);
    }

    pub fn set_database_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.database_path = value.into());
    }

    pub fn set_host(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.host = value.into());
    }

    pub fn set_port(value: u16) {
        AppConfig::set_field(|cfg| cfg.port = value);
    }

    pub fn set_device_capacity(value: i32) {
        AppConfig::set_field(|cfg| cfg.device_capacity = value);
    }

    pub fn set_sync_timeout_seconds(value: u64) {
        AppConfig::set_field(|cfg| cfg.sync_timeout_seconds = value);
    }

    pub fn set_offline_max_retries(value: i32) {
        AppConfig::set_field(|cfg| cfg.offline_max_retries = value);
    }

    pub fn set_late_grace_minutes(value: i64) {
        AppConfig::set_field(|cfg| cfg.late_grace_minutes = value);
    }

    pub fn set_lunch_window(start: NaiveTime, end: NaiveTime) {
        AppConfig::set_field(|cfg| {
            cfg.lunch_window_start = start;
            cfg.lunch_window_end = end;
        });
    }

    pub fn set_device_offline_after_seconds(value: i64) {
        AppConfig::set_field(|cfg| cfg.device_offline_after_seconds = value);
    }
}

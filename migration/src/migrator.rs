use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m202603010001_create_users::Migration),
            Box::new(migrations::m202603010002_create_class_sessions::Migration),
            Box::new(migrations::m202603010003_create_user_courses::Migration),
            Box::new(migrations::m202603010004_create_devices::Migration),
            Box::new(migrations::m202603010005_create_fingerprint_templates::Migration),
            Box::new(migrations::m202603010006_create_device_slot_assignments::Migration),
            Box::new(migrations::m202603010007_create_offline_events::Migration),
            Box::new(migrations::m202603010008_create_biometric_events::Migration),
            Box::new(migrations::m202603010009_create_raw_check_records::Migration),
            Box::new(migrations::m202603010010_create_attendance_records::Migration),
            Box::new(migrations::m202603010011_create_audit_logs::Migration),
        ]
    }
}

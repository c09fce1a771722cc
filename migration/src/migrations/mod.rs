pub mod m202603010001_create_users;
pub mod m202603010002_create_class_sessions;
pub mod m202603010003_create_user_courses;
pub mod m202603010004_create_devices;
pub mod m202603010005_create_fingerprint_templates;
pub mod m202603010006_create_device_slot_assignments;
pub mod m202603010007_create_offline_events;
pub mod m202603010008_create_biometric_events;
pub mod m202603010009_create_raw_check_records;
pub mod m202603010010_create_attendance_records;
pub mod m202603010011_create_audit_logs;

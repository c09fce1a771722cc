pub mod attendance_record;
pub mod audit_log;
pub mod biometric_event;
pub mod class_session;
pub mod device;
pub mod device_slot_assignment;
pub mod fingerprint_template;
pub mod offline_event;
pub mod raw_check_record;
pub mod user;
pub mod user_course;

pub use attendance_record::Entity as AttendanceRecord;
pub use audit_log::Entity as AuditLog;
pub use biometric_event::Entity as BiometricEvent;
pub use class_session::Entity as ClassSession;
pub use device::Entity as Device;
pub use device_slot_assignment::Entity as DeviceSlotAssignment;
pub use fingerprint_template::Entity as FingerprintTemplate;
pub use offline_event::Entity as OfflineEvent;
pub use raw_check_record::Entity as RawCheckRecord;
pub use user::Entity as User;
pub use user_course::Entity as UserCourse;

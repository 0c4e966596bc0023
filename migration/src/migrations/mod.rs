pub mod m202510010001_create_users;
pub mod m202510010002_create_attendance_sessions;
pub mod m202510010003_create_attendance_records;

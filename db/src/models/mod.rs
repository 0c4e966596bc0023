pub mod attendance_record;
pub mod attendance_session;
pub mod user;

pub use attendance_record::Entity as AttendanceRecord;
pub use attendance_session::Entity as AttendanceSession;
pub use user::Entity as User;

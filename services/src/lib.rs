pub mod attendance;
pub mod error;
pub mod identity;
pub mod proof;
pub mod reconciliation;
pub mod roster;

pub use attendance::{AttendanceService, CheckInOutcome, CreateSession, SessionDetails, SessionRef};
pub use error::{AttendanceError, AttendanceResult};
pub use identity::Identity;
pub use proof::Proof;
pub use reconciliation::{ReconciliationReport, ReconciliationWorker};
pub use roster::{RosterProvider, StudentRoster};

use db::StoreError;
use db::models::attendance_session::WindowState;
use sea_orm::DbErr;

pub type AttendanceResult<T> = Result<T, AttendanceError>;

/// Faults raised by the attendance service and the reconciliation worker.
///
/// A repeated check-in is not a fault; see
/// [`CheckInOutcome::AlreadyMarked`](crate::CheckInOutcome::AlreadyMarked).
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Attendance session {0} not found")]
    NotFound(i64),

    #[error("Invalid attendance proof: {0}")]
    InvalidProof(String),

    #[error("Attendance session {session_id} is {state}")]
    SessionClosed {
        session_id: i64,
        state: WindowState,
    },

    #[error("Could not render QR code: {0}")]
    QrCode(#[from] qrcode::types::QrError),

    #[error("Storage error: {0}")]
    Storage(#[from] DbErr),
}

impl From<StoreError> for AttendanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => AttendanceError::Validation(msg),
            StoreError::NotFound(id) => AttendanceError::NotFound(id),
            StoreError::UnknownUser(id) => {
                AttendanceError::Unauthorized(format!("User {id} is not registered"))
            }
            // check_in translates duplicates itself; anywhere else it is a storage fault
            dup @ StoreError::Duplicate { .. } => {
                AttendanceError::Storage(DbErr::Custom(dup.to_string()))
            }
            StoreError::Db(e) => AttendanceError::Storage(e),
        }
    }
}

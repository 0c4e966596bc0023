use axum::{Json, http::StatusCode};
use serde::Serialize;

/// JSON envelope shared by every endpoint:
///
/// ```json
/// { "success": true, "data": { "id": 1 }, "message": "Attendance session created" }
/// ```
///
/// Failures carry `T::default()` as `data` and put the reason in `message`.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    pub success: bool,
    pub data: T,
    pub message: String,
}

/// What handlers return: a status code and an enveloped body.
pub type ApiReply<T> = (StatusCode, Json<ApiResponse<T>>);

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self {
            success: false,
            data: T::default(),
            message: message.into(),
        }
    }

    pub fn reply(status: StatusCode, data: T, message: impl Into<String>) -> ApiReply<T> {
        (status, Json(Self::success(data, message)))
    }

    pub fn fail(status: StatusCode, message: impl Into<String>) -> ApiReply<T>
    where
        T: Default,
    {
        (status, Json(Self::error(message)))
    }
}

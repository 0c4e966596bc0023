use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::svg;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{AttendanceError, AttendanceResult};

/// Smallest edge, in pixels, of the rendered QR image.
const QR_MIN_SIZE: u32 = 300;

/// Proof-of-presence payload shown to participants as a QR code.
///
/// The payload names the session and nothing else; it is neither signed nor
/// bound to a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proof {
    pub session_id: i64,
    pub payload: String,
    /// `data:` URL of an SVG QR code encoding `payload`.
    pub qr_code: String,
}

impl Proof {
    pub fn for_session(session_id: i64) -> AttendanceResult<Self> {
        let payload = json!({ "session_id": session_id }).to_string();
        let qr_code = qr_data_url(&payload)?;
        Ok(Self {
            session_id,
            payload,
            qr_code,
        })
    }

    /// Extracts the session id from a scanned payload.
    ///
    /// Accepts `session_id` or the older `sessionId` key, holding either a
    /// number or a numeric string.
    pub fn decode(payload: &str) -> AttendanceResult<i64> {
        let value: Value = serde_json::from_str(payload.trim())
            .map_err(|_| invalid("payload is not valid JSON"))?;

        // QR scanners sometimes hand back the payload JSON-encoded a second time
        match value {
            Value::String(inner) => serde_json::from_str::<Value>(inner.trim())
                .map_err(|_| invalid("payload is not valid JSON"))
                .and_then(|v| Self::decode_value(&v)),
            other => Self::decode_value(&other),
        }
    }

    pub fn decode_value(value: &Value) -> AttendanceResult<i64> {
        let fields = value
            .as_object()
            .ok_or_else(|| invalid("payload must be a JSON object"))?;

        let raw = fields
            .get("session_id")
            .or_else(|| fields.get("sessionId"))
            .ok_or_else(|| invalid("payload does not name a session"))?;

        let id = match raw {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };

        id.filter(|id| *id > 0)
            .ok_or_else(|| invalid("session id must be a positive integer"))
    }
}

fn qr_data_url(payload: &str) -> AttendanceResult<String> {
    let image = QrCode::new(payload.as_bytes())?
        .render::<svg::Color>()
        .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
        .quiet_zone(true)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}

fn invalid(msg: &str) -> AttendanceError {
    AttendanceError::InvalidProof(msg.to_string())
}

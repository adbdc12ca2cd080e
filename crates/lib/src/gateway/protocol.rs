//! JSON response bodies.

use crate::contact::{ContactError, DeliveryDiagnostics, Submission};
use serde::{Deserialize, Serialize};

/// Contact endpoint reply: `{ ok, previewUrl?, delivery?, error? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContactResponse {
    pub fn accepted(submission: Submission) -> Self {
        Self {
            ok: true,
            preview_url: submission.preview_url,
            delivery: submission
                .delivery
                .as_ref()
                .and_then(|d: &DeliveryDiagnostics| serde_json::to_value(d).ok()),
            error: None,
        }
    }

    pub fn rejected(err: ContactError) -> Self {
        Self {
            ok: false,
            preview_url: None,
            delivery: None,
            error: Some(err.to_string()),
        }
    }
}

/// `GET /` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub runtime: String,
    pub mode: String,
    pub port: u16,
    pub providers: Vec<String>,
}

/// `GET /api/site` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteResponse {
    pub whatsapp_url: Option<String>,
}

/// `https://wa.me/<digits>`; None when the number has no digits.
pub(crate) fn whatsapp_url(number: &str) -> Option<String> {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("https://wa.me/{}", digits))
    }
}

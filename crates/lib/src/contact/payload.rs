//! Inquiry payload as posted by the contact form.

use super::handler::ContactError;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;

const UNKNOWN_CLIENT: &str = "unknown";

/// Raw form submission. Every field is optional on the wire; `website` is the honeypot and
/// accepts any JSON value so bots posting non-strings still get the silent success.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryPayload {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub website: Option<Value>,
}

/// A submission with every required field present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inquiry {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub company: Option<String>,
}

fn present(field: &Option<String>) -> Option<String> {
    field.as_ref().filter(|s| !s.is_empty()).cloned()
}

fn required(field: &Option<String>) -> Result<String, ContactError> {
    present(field).ok_or(ContactError::MissingFields)
}

/// Anything but null, false, zero, or an empty string.
fn filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl InquiryPayload {
    /// Parse a request body. A JSON `null` body is an empty payload.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let payload: Option<InquiryPayload> = serde_json::from_slice(body)?;
        Ok(payload.unwrap_or_default())
    }

    /// Bots fill the hidden `website` field; people never see it.
    pub fn is_honeypot(&self) -> bool {
        self.website.as_ref().is_some_and(filled)
    }

    /// Required: first name, last name, email, subject, message. No format checks.
    pub fn validate(&self) -> Result<Inquiry, ContactError> {
        Ok(Inquiry {
            first_name: required(&self.first_name)?,
            last_name: required(&self.last_name)?,
            email: required(&self.email)?,
            subject: required(&self.subject)?,
            message: required(&self.message)?,
            company: present(&self.company),
        })
    }
}

/// Client address for rate limiting: first `x-forwarded-for` entry, else the peer address,
/// else "unknown".
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_CLIENT.to_string(),
    }
}

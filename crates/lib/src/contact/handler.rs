//! The submit operation: honeypot, rate limit, validation, then the delivery chain.

use super::payload::InquiryPayload;
use super::rate_limit::{RateDecision, RateLimiter};
use crate::config::RuntimeMode;
use crate::delivery::{
    AttemptFailure, ChainFailure, DeliveryChain, DeliveryReport, Dispatched, FailureReason,
};
use axum::http::StatusCode;
use serde::Serialize;
use std::sync::Arc;

/// User-facing failures. The Display text is what the form shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContactError {
    #[error("Please wait a moment before sending another message.")]
    RateLimited,
    #[error("Missing required fields")]
    MissingFields,
    #[error("Invalid request")]
    InvalidRequest,
    #[error("Email is not configured. Set SMTP_HOST, SMTP_PORT, SMTP_USER, SMTP_PASS, EMAIL_TO.")]
    NotConfigured,
    #[error("Email credentials are invalid. Please verify SMTP settings.")]
    InvalidCredentials,
    #[error("Email provider error. Please try again later.")]
    Provider,
}

impl ContactError {
    pub fn status(self) -> StatusCode {
        match self {
            ContactError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ContactError::MissingFields | ContactError::InvalidRequest => StatusCode::BAD_REQUEST,
            ContactError::NotConfigured
            | ContactError::InvalidCredentials
            | ContactError::Provider => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&ChainFailure> for ContactError {
    fn from(failure: &ChainFailure) -> Self {
        match failure.classify() {
            FailureReason::NotConfigured => ContactError::NotConfigured,
            FailureReason::InvalidCredentials => ContactError::InvalidCredentials,
            FailureReason::ProviderError => ContactError::Provider,
        }
    }
}

/// Delivery details returned to the form outside production.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDiagnostics {
    #[serde(flatten)]
    pub report: DeliveryReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_attempts: Vec<AttemptFailure>,
}

/// Accepted submission. A suppressed (honeypot) submission is the default value, so it is
/// indistinguishable from a real one.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub preview_url: Option<String>,
    pub delivery: Option<DeliveryDiagnostics>,
}

pub struct ContactHandler {
    limiter: Arc<RateLimiter>,
    chain: DeliveryChain,
    mode: RuntimeMode,
}

impl ContactHandler {
    pub fn new(limiter: Arc<RateLimiter>, chain: DeliveryChain, mode: RuntimeMode) -> Self {
        Self {
            limiter,
            chain,
            mode,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.chain.provider_names()
    }

    /// Handle one submission from `client_ip`.
    pub async fn submit(
        &self,
        payload: InquiryPayload,
        client_ip: &str,
    ) -> Result<Submission, ContactError> {
        let id = uuid::Uuid::new_v4();
        if payload.is_honeypot() {
            log::info!("inquiry {}: honeypot filled, suppressing", id);
            return Ok(Submission::default());
        }

        if let RateDecision::Limited { retry_after } = self.limiter.check_and_record(client_ip).await
        {
            log::info!(
                "inquiry {}: rate limited {} (retry in {}s)",
                id,
                client_ip,
                retry_after.as_secs()
            );
            return Err(ContactError::RateLimited);
        }

        let inquiry = match payload.validate() {
            Ok(inquiry) => inquiry,
            Err(e) => {
                log::debug!("inquiry {}: {}", id, e);
                return Err(e);
            }
        };

        match self.chain.dispatch(&inquiry).await {
            Ok(Dispatched {
                report,
                failed_attempts,
            }) => {
                log::info!("inquiry {}: delivered via {}", id, report.provider);
                let preview_url = report.preview_url.clone();
                let delivery = (!self.mode.is_production()).then_some(DeliveryDiagnostics {
                    report,
                    failed_attempts,
                });
                Ok(Submission {
                    preview_url,
                    delivery,
                })
            }
            Err(failure) => {
                let err = ContactError::from(&failure);
                log::error!(
                    "inquiry {}: all {} provider(s) failed: {:?}",
                    id,
                    failure.errors.len(),
                    failure.classify()
                );
                Err(err)
            }
        }
    }
}

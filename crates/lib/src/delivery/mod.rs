//! Delivery strategies: ordered mail providers tried until one succeeds.
//!
//! Each strategy sends the company notification and, best-effort, an acknowledgment back
//! to the inquirer. The chain stops at the first strategy that delivers the notification.

#[cfg(test)]
mod fake_smtp;
mod message;
mod preview;
mod sendgrid;
mod smtp;

pub use message::{acknowledgment, notification, MailMessage};
pub use preview::{preview_url_from_response, PreviewStrategy};
pub use sendgrid::SendGridStrategy;
pub use smtp::SmtpStrategy;

use crate::config::{MailSettings, RuntimeMode};
use crate::contact::Inquiry;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Why a strategy did not deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NotConfigured,
    InvalidCredentials,
    ProviderError,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("{provider}: not configured")]
    NotConfigured { provider: &'static str },
    #[error("{provider}: invalid credentials: {detail}")]
    InvalidCredentials {
        provider: &'static str,
        detail: String,
    },
    #[error("{provider}: provider error: {detail}")]
    Provider {
        provider: &'static str,
        detail: String,
    },
    /// The provider accepted the connection but refused the notification. Ends the chain.
    #[error("{provider}: notification rejected after verification: {detail}")]
    Rejected {
        provider: &'static str,
        detail: String,
    },
}

impl DeliveryError {
    pub fn reason(&self) -> FailureReason {
        match self {
            DeliveryError::NotConfigured { .. } => FailureReason::NotConfigured,
            DeliveryError::InvalidCredentials { .. } => FailureReason::InvalidCredentials,
            DeliveryError::Provider { .. } | DeliveryError::Rejected { .. } => {
                FailureReason::ProviderError
            }
        }
    }

    /// Later strategies must not be tried after this error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryError::Rejected { .. })
    }

    /// Mark a provider error as terminal; other errors are unchanged.
    pub fn into_terminal(self) -> Self {
        match self {
            DeliveryError::Provider { provider, detail } => {
                DeliveryError::Rejected { provider, detail }
            }
            other => other,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            DeliveryError::NotConfigured { provider }
            | DeliveryError::InvalidCredentials { provider, .. }
            | DeliveryError::Provider { provider, .. }
            | DeliveryError::Rejected { provider, .. } => provider,
        }
    }
}

/// Outcome of the best-effort acknowledgment to the inquirer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Sent,
    Failed,
    Skipped,
}

/// A successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub provider: &'static str,
    pub messages_sent: usize,
    pub acknowledgment: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

/// A mail provider the chain can try.
#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    /// Provider name (e.g. "smtp").
    fn name(&self) -> &'static str;

    /// Deliver the notification (and acknowledgment) for one inquiry.
    async fn attempt(&self, inquiry: &Inquiry) -> Result<DeliveryReport, DeliveryError>;
}

/// Server reply for one accepted message (e.g. the SMTP `250 ...` line), when the transport has one.
#[derive(Debug, Clone, Default)]
pub(crate) struct SendReceipt {
    pub response: Option<String>,
}

/// A configured transport able to send one message.
#[async_trait]
pub(crate) trait Outbox: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<SendReceipt, String>;
}

/// Send the notification, then the acknowledgment if any. Only the notification must succeed.
/// Returns the notification receipt, the number of messages sent, and the acknowledgment status.
pub(crate) async fn send_notification_and_ack(
    provider: &'static str,
    outbox: &dyn Outbox,
    notification: &MailMessage,
    ack: Option<&MailMessage>,
) -> Result<(SendReceipt, usize, AckStatus), DeliveryError> {
    let receipt = outbox
        .send(notification)
        .await
        .map_err(|detail| DeliveryError::Provider { provider, detail })?;
    let Some(ack) = ack else {
        return Ok((receipt, 1, AckStatus::Skipped));
    };
    match outbox.send(ack).await {
        Ok(_) => Ok((receipt, 2, AckStatus::Sent)),
        Err(e) => {
            log::warn!("{}: acknowledgment to inquirer failed: {}", provider, e);
            Ok((receipt, 1, AckStatus::Failed))
        }
    }
}

/// A strategy failure recorded while dispatching.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFailure {
    pub provider: &'static str,
    pub reason: FailureReason,
}

impl From<&DeliveryError> for AttemptFailure {
    fn from(e: &DeliveryError) -> Self {
        Self {
            provider: e.provider(),
            reason: e.reason(),
        }
    }
}

/// Successful dispatch: the delivering strategy's report plus any strategies that failed first.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub report: DeliveryReport,
    pub failed_attempts: Vec<AttemptFailure>,
}

/// Every strategy failed.
#[derive(Debug)]
pub struct ChainFailure {
    pub errors: Vec<DeliveryError>,
}

impl ChainFailure {
    /// The primary (first) strategy's reason decides what operators are told: missing
    /// configuration first, then bad credentials, else a generic provider error. A terminal
    /// rejection is always a provider error.
    pub fn classify(&self) -> FailureReason {
        if self.errors.iter().any(DeliveryError::is_terminal) {
            return FailureReason::ProviderError;
        }
        match self.errors.first().map(DeliveryError::reason) {
            None | Some(FailureReason::NotConfigured) => FailureReason::NotConfigured,
            Some(FailureReason::InvalidCredentials) => FailureReason::InvalidCredentials,
            Some(FailureReason::ProviderError) => FailureReason::ProviderError,
        }
    }
}

/// Ordered list of strategies.
#[derive(Clone, Default)]
pub struct DeliveryChain {
    strategies: Vec<Arc<dyn DeliveryStrategy>>,
}

impl DeliveryChain {
    pub fn new(strategies: Vec<Arc<dyn DeliveryStrategy>>) -> Self {
        Self { strategies }
    }

    /// SMTP, then the email API, then (outside production) the preview inbox.
    pub fn from_settings(settings: &MailSettings, mode: RuntimeMode, company_name: &str) -> Self {
        let mut strategies: Vec<Arc<dyn DeliveryStrategy>> = vec![
            Arc::new(SmtpStrategy::new(settings.smtp.clone(), company_name)),
            Arc::new(SendGridStrategy::new(settings.sendgrid.clone(), company_name)),
        ];
        if !mode.is_production() {
            strategies.push(Arc::new(PreviewStrategy::new(
                settings.inbox.clone(),
                company_name,
            )));
        }
        Self::new(strategies)
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try each strategy in order; stop at the first success or a terminal failure.
    pub async fn dispatch(&self, inquiry: &Inquiry) -> Result<Dispatched, ChainFailure> {
        let mut errors = Vec::new();
        for strategy in &self.strategies {
            match strategy.attempt(inquiry).await {
                Ok(report) => {
                    log::info!(
                        "delivered via {} ({} message(s), acknowledgment {:?})",
                        report.provider,
                        report.messages_sent,
                        report.acknowledgment
                    );
                    return Ok(Dispatched {
                        report,
                        failed_attempts: errors.iter().map(AttemptFailure::from).collect(),
                    });
                }
                Err(e) => {
                    match e.reason() {
                        FailureReason::NotConfigured => log::debug!("{}", e),
                        _ => log::warn!("{}", e),
                    }
                    let terminal = e.is_terminal();
                    errors.push(e);
                    if terminal {
                        break;
                    }
                }
            }
        }
        Err(ChainFailure { errors })
    }
}

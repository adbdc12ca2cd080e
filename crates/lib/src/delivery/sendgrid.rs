//! Transactional email API strategy (SendGrid v3 `mail/send`).

use super::{
    acknowledgment, notification, send_notification_and_ack, DeliveryError, DeliveryReport,
    DeliveryStrategy, MailMessage, Outbox, SendReceipt,
};
use crate::config::SendGridSettings;
use crate::contact::Inquiry;
use async_trait::async_trait;
use serde::Serialize;

const PROVIDER: &str = "sendgrid";

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    typ: &'a str,
    value: &'a str,
}

/// Request body for POST /v3/mail/send.
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<Address<'a>>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

impl<'a> From<&'a MailMessage> for SendRequest<'a> {
    fn from(m: &'a MailMessage) -> Self {
        Self {
            personalizations: vec![Personalization {
                to: vec![Address { email: &m.to }],
            }],
            from: Address { email: &m.from },
            reply_to: m.reply_to.as_deref().map(|email| Address { email }),
            subject: &m.subject,
            content: vec![Content {
                typ: "text/plain",
                value: &m.text,
            }],
        }
    }
}

struct ApiOutbox<'a> {
    client: &'a reqwest::Client,
    url: String,
    api_key: &'a str,
}

#[async_trait]
impl<'a> Outbox for ApiOutbox<'a> {
    async fn send(&self, message: &MailMessage) -> Result<SendReceipt, String> {
        let res = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key)
            .json(&SendRequest::from(message))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("mail/send failed: {} {}", status, body));
        }
        Ok(SendReceipt {
            response: Some(res.status().to_string()),
        })
    }
}

/// Secondary strategy: used when SMTP is not configured or fails.
pub struct SendGridStrategy {
    settings: SendGridSettings,
    company_name: String,
    client: reqwest::Client,
}

impl SendGridStrategy {
    pub fn new(settings: SendGridSettings, company_name: &str) -> Self {
        Self {
            settings,
            company_name: company_name.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for SendGridStrategy {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn attempt(&self, inquiry: &Inquiry) -> Result<DeliveryReport, DeliveryError> {
        let Some(api_key) = self.settings.api_key.as_deref() else {
            return Err(DeliveryError::NotConfigured { provider: PROVIDER });
        };
        let outbox = ApiOutbox {
            client: &self.client,
            url: format!("{}/v3/mail/send", self.settings.api_base),
            api_key,
        };
        let inbox = self.settings.inbox.as_str();
        let note = notification(inquiry, inbox, inbox, "[Website]");
        let ack = acknowledgment(inquiry, inbox, &self.company_name);
        let (_, messages_sent, acknowledgment) =
            send_notification_and_ack(PROVIDER, &outbox, &note, ack.as_ref()).await?;
        Ok(DeliveryReport {
            provider: PROVIDER,
            messages_sent,
            acknowledgment,
            preview_url: None,
        })
    }
}

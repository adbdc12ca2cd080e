//! Development-only preview strategy: sends to a disposable Ethereal inbox and returns a
//! link where the message can be viewed. Never delivers to a real recipient.

use super::smtp::{build_transport, SmtpOutbox};
use super::{
    acknowledgment, notification, send_notification_and_ack, DeliveryError, DeliveryReport,
    DeliveryStrategy,
};
use crate::contact::Inquiry;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;

const PROVIDER: &str = "preview";
const ACCOUNT_API_URL: &str = "https://api.nodemailer.com/user";
const DEFAULT_WEB_BASE: &str = "https://ethereal.email";

/// Response of the disposable account API.
#[derive(Debug, Clone, Deserialize)]
struct TestAccount {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: String,
    #[serde(default)]
    pass: String,
    #[serde(default)]
    smtp: Option<TestAccountSmtp>,
    #[serde(default)]
    web: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TestAccountSmtp {
    host: String,
    port: u16,
    #[serde(default)]
    secure: bool,
}

/// Extract the viewable message URL from an Ethereal `250 Accepted [STATUS=new MSGID=...]` reply.
pub fn preview_url_from_response(web_base: &str, response: &str) -> Option<String> {
    let start = response.find("MSGID=")? + "MSGID=".len();
    let id: String = response[start..]
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != ']')
        .collect();
    if id.is_empty() {
        return None;
    }
    Some(format!("{}/message/{}", web_base.trim_end_matches('/'), id))
}

pub struct PreviewStrategy {
    inbox: String,
    company_name: String,
    client: reqwest::Client,
    /// Created on first use and reused for the life of the process.
    account: OnceCell<TestAccount>,
}

impl PreviewStrategy {
    pub fn new(inbox: String, company_name: &str) -> Self {
        Self {
            inbox,
            company_name: company_name.to_string(),
            client: reqwest::Client::new(),
            account: OnceCell::new(),
        }
    }

    async fn create_account(&self) -> Result<TestAccount, String> {
        let body = serde_json::json!({
            "requestor": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        });
        let res = self
            .client
            .post(ACCOUNT_API_URL)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("test account request failed: {} {}", status, body));
        }
        let account: TestAccount = res.json().await.map_err(|e| e.to_string())?;
        if account.status.as_deref() != Some("success") || account.smtp.is_none() {
            return Err(account
                .error
                .unwrap_or_else(|| "test account request was not successful".to_string()));
        }
        log::info!("created disposable preview mailbox {}", account.user);
        Ok(account)
    }
}

#[async_trait]
impl DeliveryStrategy for PreviewStrategy {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn attempt(&self, inquiry: &Inquiry) -> Result<DeliveryReport, DeliveryError> {
        let provider_error = |detail: String| DeliveryError::Provider {
            provider: PROVIDER,
            detail,
        };
        let account = self
            .account
            .get_or_try_init(|| self.create_account())
            .await
            .map_err(provider_error)?;
        let Some(ref smtp) = account.smtp else {
            return Err(provider_error("test account has no smtp settings".to_string()));
        };
        let transport = build_transport(&smtp.host, smtp.port, &account.user, &account.pass, smtp.secure)
            .map_err(provider_error)?;
        let outbox = SmtpOutbox { transport };

        let from = format!("{} <no-reply@ethereal.dev>", self.company_name);
        let note = notification(inquiry, &from, &self.inbox, "[DEV]");
        let ack = acknowledgment(inquiry, &from, &self.company_name);
        let (receipt, messages_sent, acknowledgment) =
            send_notification_and_ack(PROVIDER, &outbox, &note, ack.as_ref()).await?;

        let web = account.web.as_deref().unwrap_or(DEFAULT_WEB_BASE);
        let preview_url = receipt
            .response
            .as_deref()
            .and_then(|r| preview_url_from_response(web, r));
        if let Some(ref url) = preview_url {
            log::info!("preview message available at {}", url);
        }
        Ok(DeliveryReport {
            provider: PROVIDER,
            messages_sent,
            acknowledgment,
            preview_url,
        })
    }
}

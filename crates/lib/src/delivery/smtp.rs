//! SMTP relay strategy (lettre). Port 465 uses implicit TLS; any other port upgrades with
//! STARTTLS when the server offers it.

use super::{
    acknowledgment, notification, send_notification_and_ack, DeliveryError, DeliveryReport,
    DeliveryStrategy, MailMessage, Outbox, SendReceipt,
};
use crate::config::SmtpSettings;
use crate::contact::Inquiry;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

const PROVIDER: &str = "smtp";
const IMPLICIT_TLS_PORT: u16 = 465;

/// Build an authenticated transport for `host:port`.
pub(crate) fn build_transport(
    host: &str,
    port: u16,
    user: &str,
    pass: &str,
    implicit_tls: bool,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, String> {
    let params = TlsParameters::new(host.to_string()).map_err(|e| e.to_string())?;
    let tls = if implicit_tls {
        Tls::Wrapper(params)
    } else {
        Tls::Opportunistic(params)
    };
    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        .port(port)
        .tls(tls)
        .credentials(Credentials::new(user.to_string(), pass.to_string()))
        .build())
}

/// Convert to a lettre message. An unparsable reply-to is dropped rather than failing the send.
pub(crate) fn to_lettre(message: &MailMessage) -> Result<Message, String> {
    let from: Mailbox = message
        .from
        .parse()
        .map_err(|e| format!("invalid sender {:?}: {}", message.from, e))?;
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|e| format!("invalid recipient {:?}: {}", message.to, e))?;
    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_PLAIN);
    if let Some(ref reply_to) = message.reply_to {
        match reply_to.parse::<Mailbox>() {
            Ok(mb) => builder = builder.reply_to(mb),
            Err(e) => log::warn!("dropping unparsable reply-to {:?}: {}", reply_to, e),
        }
    }
    builder
        .body(message.text.clone())
        .map_err(|e| format!("building message: {}", e))
}

/// Sends through an already-built transport.
pub(crate) struct SmtpOutbox {
    pub transport: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl Outbox for SmtpOutbox {
    async fn send(&self, message: &MailMessage) -> Result<SendReceipt, String> {
        let email = to_lettre(message)?;
        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| e.to_string())?;
        let line = response.message().collect::<Vec<_>>().join(" ");
        Ok(SendReceipt {
            response: Some(format!("{} {}", response.code(), line)),
        })
    }
}

/// Primary strategy: the operator's SMTP relay.
pub struct SmtpStrategy {
    settings: SmtpSettings,
    company_name: String,
}

impl SmtpStrategy {
    pub fn new(settings: SmtpSettings, company_name: &str) -> Self {
        Self {
            settings,
            company_name: company_name.to_string(),
        }
    }

    /// Connect and authenticate without sending. Missing settings => NotConfigured.
    pub async fn verify(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
        let (Some(host), Some(port), Some(user), Some(pass)) = (
            self.settings.host.as_deref(),
            self.settings.port,
            self.settings.user.as_deref(),
            self.settings.pass.as_deref(),
        ) else {
            return Err(DeliveryError::NotConfigured { provider: PROVIDER });
        };
        let transport = build_transport(host, port, user, pass, port == IMPLICIT_TLS_PORT)
            .map_err(|detail| DeliveryError::InvalidCredentials {
                provider: PROVIDER,
                detail,
            })?;
        match transport.test_connection().await {
            Ok(true) => Ok(transport),
            Ok(false) => Err(DeliveryError::InvalidCredentials {
                provider: PROVIDER,
                detail: format!("{}:{} did not accept the connection", host, port),
            }),
            Err(e) => Err(DeliveryError::InvalidCredentials {
                provider: PROVIDER,
                detail: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl DeliveryStrategy for SmtpStrategy {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn attempt(&self, inquiry: &Inquiry) -> Result<DeliveryReport, DeliveryError> {
        let transport = self.verify().await?;
        let outbox = SmtpOutbox { transport };
        let note = notification(inquiry, &self.settings.from, &self.settings.to, "[Website]");
        let ack = acknowledgment(inquiry, &self.settings.from, &self.company_name);
        // Verified relays that refuse the notification end the chain.
        let (_, messages_sent, acknowledgment) =
            send_notification_and_ack(PROVIDER, &outbox, &note, ack.as_ref())
                .await
                .map_err(DeliveryError::into_terminal)?;
        Ok(DeliveryReport {
            provider: PROVIDER,
            messages_sent,
            acknowledgment,
            preview_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::fake_smtp::FakeSmtp;
    use crate::delivery::tests::inquiry;
    use crate::delivery::{AckStatus, FailureReason};

    fn loopback(relay: &FakeSmtp) -> SmtpSettings {
        SmtpSettings {
            host: Some("127.0.0.1".into()),
            port: Some(relay.addr.port()),
            user: Some("site@example.com".into()),
            pass: Some("secret".into()),
            from: "site@example.com".into(),
            to: "inbox@example.com".into(),
        }
    }

    #[tokio::test]
    async fn verified_relay_gets_notification_then_acknowledgment() {
        let relay = FakeSmtp::start(None, "250 2.0.0 Ok: queued").await;
        let report = SmtpStrategy::new(loopback(&relay), "Acme")
            .attempt(&inquiry())
            .await
            .unwrap();
        assert_eq!(report.provider, "smtp");
        assert_eq!(report.messages_sent, 2);
        assert_eq!(report.acknowledgment, AckStatus::Sent);

        let rcpts = relay.recipients();
        assert_eq!(rcpts.len(), 2);
        assert!(rcpts[0].contains("<inbox@example.com>"));
        assert!(rcpts[1].contains("<ada@example.com>"));
        let messages = relay.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Reply-To: ada@example.com"));
        assert!(messages[0].contains("Subject: [Website] Audit"));
    }

    #[tokio::test]
    async fn refused_acknowledgment_still_delivers() {
        let relay = FakeSmtp::start(Some("ada@example.com"), "250 2.0.0 Ok: queued").await;
        let report = SmtpStrategy::new(loopback(&relay), "Acme")
            .attempt(&inquiry())
            .await
            .unwrap();
        assert_eq!(report.messages_sent, 1);
        assert_eq!(report.acknowledgment, AckStatus::Failed);
        assert_eq!(relay.messages().len(), 1);
    }

    #[tokio::test]
    async fn refused_notification_is_terminal() {
        let relay = FakeSmtp::start(Some("inbox@example.com"), "250 2.0.0 Ok: queued").await;
        let err = SmtpStrategy::new(loopback(&relay), "Acme")
            .attempt(&inquiry())
            .await
            .unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(err.reason(), FailureReason::ProviderError);
        assert!(relay.messages().is_empty());
    }

    #[tokio::test]
    async fn incomplete_settings_are_not_configured() {
        let settings = SmtpSettings {
            host: Some("smtp.example.com".into()),
            port: None,
            user: Some("user@example.com".into()),
            pass: Some("secret".into()),
            from: "user@example.com".into(),
            to: "inbox@example.com".into(),
        };
        let strategy = SmtpStrategy::new(settings, "Acme");
        let err = strategy.attempt(&inquiry()).await.unwrap_err();
        assert_eq!(err.reason(), FailureReason::NotConfigured);
    }

    #[tokio::test]
    async fn unreachable_server_is_invalid_credentials() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let settings = SmtpSettings {
            host: Some("127.0.0.1".into()),
            port: Some(port),
            user: Some("user@example.com".into()),
            pass: Some("secret".into()),
            from: "user@example.com".into(),
            to: "inbox@example.com".into(),
        };
        let err = SmtpStrategy::new(settings, "Acme")
            .attempt(&inquiry())
            .await
            .unwrap_err();
        assert_eq!(err.reason(), FailureReason::InvalidCredentials);
    }

    #[test]
    fn lettre_message_carries_reply_to() {
        let i = inquiry();
        let m = notification(&i, "Site <site@acme.test>", "inbox@acme.test", "[Website]");
        let email = to_lettre(&m).unwrap();
        let raw = String::from_utf8(email.formatted()).unwrap();
        assert!(raw.contains("Reply-To: ada@example.com"));
        assert!(raw.contains("Subject: [Website] Audit"));
    }

    #[test]
    fn bad_reply_to_is_dropped() {
        let mut i = inquiry();
        i.email = "not an address".into();
        let m = notification(&i, "site@acme.test", "inbox@acme.test", "[Website]");
        let raw = String::from_utf8(to_lettre(&m).unwrap().formatted()).unwrap();
        assert!(!raw.contains("Reply-To"));
    }

    #[test]
    fn bad_recipient_fails() {
        let mut i = inquiry();
        i.email = "not an address".into();
        let ack = acknowledgment(&i, "site@acme.test", "Acme").unwrap();
        assert!(to_lettre(&ack).is_err());
    }
}

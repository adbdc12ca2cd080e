//! Provider-neutral outbound messages composed from an inquiry.

use crate::contact::Inquiry;

/// One plain-text email. Addresses are kept as strings; each transport parses them its own way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
}

/// Company notification for a new inquiry. Replies go to the inquirer.
pub fn notification(inquiry: &Inquiry, from: &str, to: &str, subject_prefix: &str) -> MailMessage {
    let text = format!(
        "New contact inquiry\n\nName: {} {}\nEmail: {}\nCompany: {}\nSubject: {}\nReceived: {}\n\nMessage:\n{}",
        inquiry.first_name,
        inquiry.last_name,
        inquiry.email,
        inquiry.company.as_deref().unwrap_or("-"),
        inquiry.subject,
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        inquiry.message,
    );
    MailMessage {
        from: from.to_string(),
        to: to.to_string(),
        reply_to: Some(inquiry.email.clone()).filter(|e| !e.is_empty()),
        subject: format!("{} {}", subject_prefix, inquiry.subject),
        text,
    }
}

/// Acknowledgment back to the inquirer; `None` when no inquirer address was given.
pub fn acknowledgment(inquiry: &Inquiry, from: &str, company_name: &str) -> Option<MailMessage> {
    if inquiry.email.is_empty() {
        return None;
    }
    Some(MailMessage {
        from: from.to_string(),
        to: inquiry.email.clone(),
        reply_to: None,
        subject: format!("We received your message – {}", company_name),
        text: "Thank you for reaching out. Our team will contact you shortly.".to_string(),
    })
}

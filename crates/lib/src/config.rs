//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.trucept/relay.json`) and environment.
//! Environment values always win over the file; mail settings are resolved once at
//! startup into [`MailSettings`] so nothing downstream reads the environment again.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_INBOX: &str = "contact@truceptconsulting.com";
const DEFAULT_COMPANY_NAME: &str = "Trucept Consulting";
const DEFAULT_SENDGRID_API_BASE: &str = "https://api.sendgrid.com";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Contact form behaviour (rate limiting, company identity).
    #[serde(default)]
    pub contact: ContactConfig,

    /// File-level mail provider settings. Environment variables override each field.
    #[serde(default)]
    pub mail: MailConfig,

    /// Values surfaced to the site front end.
    #[serde(default)]
    pub site: SiteConfig,

    /// Runtime mode. Overridden by RELAY_ENV.
    #[serde(default)]
    pub runtime: RuntimeMode,
}

/// Server bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for HTTP (default 3000).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    3000
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactConfig {
    /// Minimum seconds between two accepted submissions from one client address.
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Upper bound on tracked client addresses; the oldest is evicted past this.
    #[serde(default = "default_rate_limit_max_entries")]
    pub rate_limit_max_entries: usize,

    /// Company name used in acknowledgment subjects and preview sender.
    #[serde(default = "default_company_name")]
    pub company_name: String,

    /// Inbox used when EMAIL_TO is not set.
    #[serde(default = "default_inbox")]
    pub default_inbox: String,
}

fn default_rate_limit_window_secs() -> u64 {
    30
}

fn default_rate_limit_max_entries() -> usize {
    10_000
}

fn default_company_name() -> String {
    DEFAULT_COMPANY_NAME.to_string()
}

fn default_inbox() -> String {
    DEFAULT_INBOX.to_string()
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            rate_limit_window_secs: default_rate_limit_window_secs(),
            rate_limit_max_entries: default_rate_limit_max_entries(),
            company_name: default_company_name(),
            default_inbox: default_inbox(),
        }
    }
}

/// Mail options as they may appear in the config file. Each is overridden by its env var
/// (SMTP_HOST, SMTP_PORT, SMTP_USER, SMTP_PASS, SMTP_FROM, EMAIL_TO, SENDGRID_API_KEY, SENDGRID_API_BASE).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_pass: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sendgrid_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sendgrid_api_base: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// WhatsApp number for the floating contact link. Overridden by NEXT_PUBLIC_WHATSAPP_NUMBER.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_number: Option<String>,
}

/// Development enables the preview provider and delivery diagnostics in responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    #[default]
    Development,
    Production,
}

impl RuntimeMode {
    pub fn is_production(self) -> bool {
        self == RuntimeMode::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeMode::Development => "development",
            RuntimeMode::Production => "production",
        }
    }

    fn parse(s: &str) -> RuntimeMode {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => RuntimeMode::Production,
            _ => RuntimeMode::Development,
        }
    }
}

/// Resolved SMTP relay settings. `from` and `to` always have a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: String,
    pub to: String,
}

impl SmtpSettings {
    /// Host, port, user, and password are all present.
    pub fn is_complete(&self) -> bool {
        self.host.is_some() && self.port.is_some() && self.user.is_some() && self.pass.is_some()
    }
}

/// Resolved transactional email API settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendGridSettings {
    pub api_key: Option<String>,
    pub api_base: String,
    /// Sender and recipient of the company notification (the company inbox).
    pub inbox: String,
}

/// All mail provider settings, resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailSettings {
    pub smtp: SmtpSettings,
    pub sendgrid: SendGridSettings,
    /// Company inbox receiving notifications.
    pub inbox: String,
}

impl MailSettings {
    /// Resolve from the process environment over the config file.
    pub fn from_env(config: &Config) -> Self {
        resolve_mail_settings(config, |key| std::env::var(key).ok())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Like `non_empty` but keeps surrounding whitespace, which may be part of a secret.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Infer an SMTP host from the account's domain when SMTP_HOST is not set.
pub fn detect_smtp_host(user: &str) -> Option<&'static str> {
    let u = user.trim().to_ascii_lowercase();
    let domain = u.rsplit_once('@').map(|(_, d)| d)?;
    match domain {
        "gmail.com" | "googlemail.com" => Some("smtp.gmail.com"),
        "truceptconsulting.com" | "privateemail.com" => Some("smtp.privateemail.com"),
        _ => None,
    }
}

/// Resolve mail settings: for each option a non-empty value from `lookup` (the environment)
/// overrides the config file. Sender falls back SMTP_FROM, EMAIL_TO, default inbox; recipient
/// falls back EMAIL_TO, default inbox.
pub fn resolve_mail_settings<F>(config: &Config, lookup: F) -> MailSettings
where
    F: Fn(&str) -> Option<String>,
{
    let file = &config.mail;
    let pick = |key: &str, fallback: &Option<String>| {
        non_empty(lookup(key)).or_else(|| non_empty(fallback.clone()))
    };
    let pick_secret = |key: &str, fallback: &Option<String>| {
        non_blank(lookup(key)).or_else(|| non_blank(fallback.clone()))
    };

    let user = pick("SMTP_USER", &file.smtp_user);
    let pass = pick_secret("SMTP_PASS", &file.smtp_pass);
    let email_to = pick("EMAIL_TO", &file.email_to);
    let inbox = email_to
        .clone()
        .unwrap_or_else(|| config.contact.default_inbox.clone());
    let from = pick("SMTP_FROM", &file.smtp_from).unwrap_or_else(|| inbox.clone());

    let port = match non_empty(lookup("SMTP_PORT")) {
        Some(raw) => match raw.parse::<u16>() {
            Ok(p) => Some(p),
            Err(_) => {
                log::warn!("ignoring invalid SMTP_PORT value {:?}", raw);
                file.smtp_port
            }
        },
        None => file.smtp_port,
    };

    let host = pick("SMTP_HOST", &file.smtp_host).or_else(|| {
        let detected = user.as_deref().and_then(detect_smtp_host)?;
        log::debug!("smtp host auto-detected: {}", detected);
        Some(detected.to_string())
    });

    let api_base = pick("SENDGRID_API_BASE", &file.sendgrid_api_base)
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_SENDGRID_API_BASE.to_string());

    MailSettings {
        smtp: SmtpSettings {
            host,
            port,
            user,
            pass,
            from,
            to: inbox.clone(),
        },
        sendgrid: SendGridSettings {
            api_key: pick_secret("SENDGRID_API_KEY", &file.sendgrid_api_key),
            api_base,
            inbox: inbox.clone(),
        },
        inbox,
    }
}

/// Resolve runtime mode: env RELAY_ENV overrides config.
pub fn resolve_runtime_mode(config: &Config) -> RuntimeMode {
    non_empty(std::env::var("RELAY_ENV").ok())
        .map(|s| RuntimeMode::parse(&s))
        .unwrap_or(config.runtime)
}

/// Resolve the WhatsApp number: env NEXT_PUBLIC_WHATSAPP_NUMBER overrides config.
pub fn resolve_whatsapp_number(config: &Config) -> Option<String> {
    non_empty(std::env::var("NEXT_PUBLIC_WHATSAPP_NUMBER").ok())
        .or_else(|| non_empty(config.site.whatsapp_number.clone()))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".trucept").join("relay.json"))
            .unwrap_or_else(|| PathBuf::from("relay.json"))
    })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_server_and_contact() {
        let c = Config::default();
        assert_eq!(c.server.port, 3000);
        assert_eq!(c.server.bind, "127.0.0.1");
        assert_eq!(c.contact.rate_limit_window_secs, 30);
        assert_eq!(c.runtime, RuntimeMode::Development);
    }

    #[test]
    fn empty_json_is_default_config() {
        let c: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(c.contact.default_inbox, "contact@truceptconsulting.com");
        assert!(c.mail.smtp_host.is_none());
    }

    #[test]
    fn runtime_mode_parses_from_json() {
        let c: Config = serde_json::from_str(r#"{"runtime":"production"}"#).unwrap();
        assert!(c.runtime.is_production());
        assert_eq!(RuntimeMode::parse("PROD"), RuntimeMode::Production);
        assert_eq!(RuntimeMode::parse("test"), RuntimeMode::Development);
    }

    #[test]
    fn nothing_configured_falls_back_to_default_inbox() {
        let mail = resolve_mail_settings(&Config::default(), lookup_from(&[]));
        assert!(!mail.smtp.is_complete());
        assert_eq!(mail.inbox, "contact@truceptconsulting.com");
        assert_eq!(mail.smtp.from, "contact@truceptconsulting.com");
        assert!(mail.sendgrid.api_key.is_none());
        assert_eq!(mail.sendgrid.api_base, "https://api.sendgrid.com");
    }

    #[test]
    fn env_overrides_file_and_from_falls_back_to_email_to() {
        let mut config = Config::default();
        config.mail.smtp_host = Some("mail.file.example".into());
        config.mail.email_to = Some("file@example.com".into());
        let mail = resolve_mail_settings(
            &config,
            lookup_from(&[
                ("SMTP_HOST", "mail.env.example"),
                ("SMTP_PORT", "587"),
                ("SMTP_USER", "user@example.com"),
                ("SMTP_PASS", "secret"),
                ("EMAIL_TO", "ops@example.com"),
            ]),
        );
        assert_eq!(mail.smtp.host.as_deref(), Some("mail.env.example"));
        assert_eq!(mail.smtp.port, Some(587));
        assert_eq!(mail.smtp.from, "ops@example.com");
        assert_eq!(mail.smtp.to, "ops@example.com");
        assert!(mail.smtp.is_complete());
    }

    #[test]
    fn blank_env_values_do_not_override() {
        let mut config = Config::default();
        config.mail.smtp_user = Some("file-user@example.com".into());
        let mail = resolve_mail_settings(&config, lookup_from(&[("SMTP_USER", "   ")]));
        assert_eq!(mail.smtp.user.as_deref(), Some("file-user@example.com"));
    }

    #[test]
    fn secrets_keep_surrounding_whitespace() {
        let mut config = Config::default();
        config.mail.sendgrid_api_key = Some("file-key".into());
        let mail = resolve_mail_settings(
            &config,
            lookup_from(&[("SMTP_PASS", " p@ss "), ("SENDGRID_API_KEY", "  ")]),
        );
        assert_eq!(mail.smtp.pass.as_deref(), Some(" p@ss "));
        assert_eq!(mail.sendgrid.api_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn smtp_host_auto_detected_from_user_domain() {
        let mail = resolve_mail_settings(
            &Config::default(),
            lookup_from(&[("SMTP_USER", "Someone@GMail.com")]),
        );
        assert_eq!(mail.smtp.host.as_deref(), Some("smtp.gmail.com"));

        let mail = resolve_mail_settings(
            &Config::default(),
            lookup_from(&[("SMTP_USER", "info@truceptconsulting.com")]),
        );
        assert_eq!(mail.smtp.host.as_deref(), Some("smtp.privateemail.com"));

        assert_eq!(detect_smtp_host("someone@example.org"), None);
        assert_eq!(detect_smtp_host("no-at-sign"), None);
    }

    #[test]
    fn explicit_host_wins_over_detection() {
        let mail = resolve_mail_settings(
            &Config::default(),
            lookup_from(&[("SMTP_USER", "a@gmail.com"), ("SMTP_HOST", "relay.internal")]),
        );
        assert_eq!(mail.smtp.host.as_deref(), Some("relay.internal"));
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mail = resolve_mail_settings(
            &Config::default(),
            lookup_from(&[("SMTP_PORT", "not-a-port")]),
        );
        assert_eq!(mail.smtp.port, None);
    }

    #[test]
    fn sendgrid_base_trailing_slash_trimmed() {
        let mail = resolve_mail_settings(
            &Config::default(),
            lookup_from(&[
                ("SENDGRID_API_KEY", "SG.key"),
                ("SENDGRID_API_BASE", "http://127.0.0.1:9999/"),
            ]),
        );
        assert_eq!(mail.sendgrid.api_key.as_deref(), Some("SG.key"));
        assert_eq!(mail.sendgrid.api_base, "http://127.0.0.1:9999");
    }

    #[test]
    fn load_config_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("relay-missing-{}.json", uuid::Uuid::new_v4()));
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn load_config_reports_parse_errors() {
        let path = std::env::temp_dir().join(format!("relay-bad-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"{ not json").unwrap();
        let err = load_config(Some(path.clone())).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config"));
        let _ = std::fs::remove_file(path);
    }
}

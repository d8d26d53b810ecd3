//! Mail transports for alert delivery
//!
//! [`SmtpMailer`] wraps the `lettre` async SMTP transport. When SMTP is not
//! configured the service falls back to [`LogMailer`], which only writes the
//! rendered alert to the log.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::ConfigError;

/// Outbound mail collaborator
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Mail delivery errors. All of them are treated as transient.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),

    #[error("Send timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Mail rejected: {0}")]
    Rejected(String),
}

const DEFAULT_FROM_ADDRESS: &str = "hostwatch@localhost";

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpTls {
    /// Plain connection upgraded with STARTTLS (usually port 587)
    #[default]
    StartTls,
    /// TLS from the first byte (usually port 465)
    Implicit,
}

impl SmtpTls {
    /// Port used when `SMTP_PORT` is unset
    pub fn default_port(&self) -> u16 {
        match self {
            SmtpTls::StartTls => 587,
            SmtpTls::Implicit => 465,
        }
    }
}

/// SMTP settings.
///
/// | Variable        | Required | Default               |
/// |-----------------|----------|-----------------------|
/// | `SMTP_HOST`     | yes      |                       |
/// | `SMTP_PORT`     | no       | `587`, `465` implicit |
/// | `SMTP_FROM`     | no       | `hostwatch@localhost` |
/// | `SMTP_USER`     | no       | unset                 |
/// | `SMTP_PASSWORD` | no       | unset                 |
/// | `SMTP_TLS`      | no       | `starttls`            |
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_address: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub tls: SmtpTls,
}

impl SmtpConfig {
    /// Returns `Ok(None)` when `SMTP_HOST` is unset
    pub fn from_lookup<F>(lookup: &F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(host) = lookup("SMTP_HOST") else {
            return Ok(None);
        };

        let tls = match lookup("SMTP_TLS").as_deref().map(str::trim) {
            None | Some("starttls") => SmtpTls::StartTls,
            Some("implicit") => SmtpTls::Implicit,
            Some(other) => {
                return Err(ConfigError::Parse {
                    key: "SMTP_TLS".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let port = match lookup("SMTP_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Parse {
                key: "SMTP_PORT".to_string(),
                value: raw,
            })?,
            None => tls.default_port(),
        };

        let from_address =
            lookup("SMTP_FROM").unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string());
        from_address
            .parse::<Mailbox>()
            .map_err(|e| ConfigError::Invalid(format!("SMTP_FROM '{}': {}", from_address, e)))?;

        Ok(Some(Self {
            host,
            port,
            from_address,
            user: lookup("SMTP_USER"),
            password: lookup("SMTP_PASSWORD"),
            tls,
        }))
    }
}

/// Sends alerts over SMTP. The transport is built once and reused.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let builder = match config.tls {
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?,
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
        };
        let mut builder = builder.port(config.port);

        if let (Some(user), Some(pass)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from: config.from_address.parse()?,
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport.send(email).await?;

        tracing::debug!(to = to, subject = subject, "Alert email sent");
        Ok(())
    }
}

/// Writes alerts to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl MailTransport for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        tracing::warn!(to = to, subject = subject, "Alert (mail not configured): {}", body);
        Ok(())
    }
}

//! Per-recipient alert fan-out

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use super::config::{AlertLevel, AlertTemplates, Thresholds};
use super::mailer::{MailError, MailTransport};
use crate::data::{MetricType, Target};
use crate::directory::{Directory, DirectoryError};

/// Delivery outcome for one recipient
#[derive(Debug)]
pub struct RecipientResult {
    pub recipient: String,
    pub outcome: Result<(), MailError>,
}

impl RecipientResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Aggregate outcome of one alert fan-out
#[derive(Debug, Default)]
pub struct NotifyResult {
    /// Number of recipients a send was attempted for
    pub attempted: usize,
    /// True when at least one recipient accepted the message
    pub succeeded: bool,
    pub per_recipient: Vec<RecipientResult>,
}

impl NotifyResult {
    /// Nothing was sent because there was nobody (or nothing) to notify
    pub fn is_noop(&self) -> bool {
        self.attempted == 0
    }

    /// Every attempted recipient accepted the message
    pub fn all_succeeded(&self) -> bool {
        self.per_recipient.iter().all(RecipientResult::is_ok)
    }

    pub fn failed(&self) -> impl Iterator<Item = &RecipientResult> {
        self.per_recipient.iter().filter(|r| !r.is_ok())
    }
}

/// Renders level-specific alerts and sends them to every recipient of a target.
///
/// Each recipient is attempted independently with its own timeout, so one
/// failing or slow mailbox cannot block the others.
pub struct NotificationDispatcher {
    directory: Arc<dyn Directory>,
    mailer: Arc<dyn MailTransport>,
    thresholds: Thresholds,
    templates: AlertTemplates,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        directory: Arc<dyn Directory>,
        mailer: Arc<dyn MailTransport>,
        thresholds: Thresholds,
        send_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            mailer,
            thresholds,
            templates: AlertTemplates::default(),
            send_timeout,
        }
    }

    pub fn with_templates(mut self, templates: AlertTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Render the subject and body for an alert
    pub fn render(
        &self,
        target: &Target,
        metric: MetricType,
        value: f64,
        level: AlertLevel,
    ) -> Option<(String, String)> {
        let template = self.templates.for_level(level)?;
        let threshold = self.thresholds.for_metric(metric).threshold_for(level)?;

        let body = template
            .replace("{target_name}", &target.name)
            .replace("{metric_type}", metric.as_str())
            .replace("{value}", &format_percent(value))
            .replace("{threshold}", &format_percent(threshold));
        let subject = format!(
            "[{}] Host {} monitoring alert",
            level.as_str().to_ascii_uppercase(),
            target.name
        );

        Some((subject, body))
    }

    /// Send the alert to every recipient bound to `target`
    pub async fn notify(
        &self,
        target: &Target,
        metric: MetricType,
        value: f64,
        level: AlertLevel,
    ) -> Result<NotifyResult, DirectoryError> {
        let Some((subject, body)) = self.render(target, metric, value, level) else {
            return Ok(NotifyResult::default());
        };

        let recipients = self.directory.recipients_of(target.id).await?;
        if recipients.is_empty() {
            tracing::debug!(target_id = %target.id, "No recipients bound to target");
            return Ok(NotifyResult::default());
        }

        let sends = recipients.into_iter().map(|recipient| {
            let subject = subject.as_str();
            let body = body.as_str();
            async move {
                let outcome =
                    match tokio::time::timeout(self.send_timeout, self.mailer.send(&recipient, subject, body))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(MailError::Timeout(self.send_timeout)),
                    };
                RecipientResult { recipient, outcome }
            }
        });
        let per_recipient = join_all(sends).await;

        let delivered = per_recipient.iter().filter(|r| r.is_ok()).count();
        for failure in per_recipient.iter().filter(|r| !r.is_ok()) {
            if let Err(e) = &failure.outcome {
                tracing::warn!(
                    target_id = %target.id,
                    metric = %metric,
                    recipient = %failure.recipient,
                    error = %e,
                    "Alert delivery failed"
                );
            }
        }

        let result = NotifyResult {
            attempted: per_recipient.len(),
            succeeded: delivered > 0,
            per_recipient,
        };

        if !result.succeeded {
            tracing::error!(
                target_id = %target.id,
                metric = %metric,
                level = %level,
                attempted = result.attempted,
                "Alert could not be delivered to any recipient"
            );
        } else if !result.all_succeeded() {
            tracing::warn!(
                target_id = %target.id,
                metric = %metric,
                level = %level,
                delivered,
                attempted = result.attempted,
                "Alert partially delivered"
            );
        } else {
            tracing::info!(
                target_id = %target.id,
                metric = %metric,
                level = %level,
                delivered,
                attempted = result.attempted,
                "Alert sent"
            );
        }

        Ok(result)
    }
}

/// Two decimals at most, without trailing zeros ("90", "92.5", "77.25")
fn format_percent(value: f64) -> String {
    let rounded = format!("{:.2}", value);
    rounded
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

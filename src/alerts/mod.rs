//! Threshold alerting
//!
//! Classifies incoming metric values against per-metric threshold sets,
//! confirms that a breach is sustained over the recent window, and fans
//! alerts out to the recipients of the affected target.

pub mod config;
pub mod evaluator;
pub mod mailer;
pub mod notifier;

pub use config::{AlertDecision, AlertLevel, AlertSettings, AlertTemplates, ThresholdSet, Thresholds};
pub use evaluator::AlertEvaluator;
pub use mailer::{LogMailer, MailError, MailTransport, SmtpConfig, SmtpMailer, SmtpTls};
pub use notifier::{NotificationDispatcher, NotifyResult, RecipientResult};

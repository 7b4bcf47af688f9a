//! Report notification via SMTP
//!
//! Reports go out over STARTTLS using the `lettre` async transport. Whether
//! a report is sent at all is decided by [`should_notify`].

use crate::report::AlertReport;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("email build error: {0}")]
    Build(String),

    #[error("mail was not sent within {0:?}")]
    Timeout(Duration),
}

/// SMTP settings; see `Config::mail_settings`
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub from: String,
    /// One address, or several separated by commas
    pub to: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub timeout: Duration,
}

/// Send when something deviated, or unconditionally if configured so
pub fn should_notify(always_send: bool, alerts: &AlertReport) -> bool {
    always_send || alerts.has_any_alert()
}

fn plural(count: usize) -> &'static str {
    if count > 1 {
        "s"
    } else {
        ""
    }
}

/// Mail subject summarising the alert counts
///
/// # Example
/// ```
/// use linkrtt::notify::subject;
/// use linkrtt::report::AlertReport;
///
/// assert_eq!(
///     subject(&AlertReport::default()),
///     "[INFO][Network Lines] 0 regression - 0 improvement"
/// );
/// ```
pub fn subject(alerts: &AlertReport) -> String {
    let tag = if alerts.has_any_alert() {
        "[ALERT]"
    } else {
        "[INFO]"
    };
    let regressions = alerts.regression_count();
    let improvements = alerts.improvement_count();
    format!(
        "{}[Network Lines] {} regression{} - {} improvement{}",
        tag,
        regressions,
        plural(regressions),
        improvements,
        plural(improvements)
    )
}

/// Sends HTML reports by mail
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    settings: MailSettings,
}

impl EmailNotifier {
    pub fn new(settings: MailSettings) -> Self {
        Self { settings }
    }

    /// Assemble the MIME message without sending it
    pub fn build_message(&self, subject: &str, html: &str) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.settings.from.trim().parse::<Mailbox>()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML);

        let mut recipients = 0;
        for address in self.settings.to.split(',').map(str::trim) {
            if address.is_empty() {
                continue;
            }
            builder = builder.to(address.parse::<Mailbox>()?);
            recipients += 1;
        }
        if recipients == 0 {
            return Err(NotifyError::Build("no recipient address".to_string()));
        }

        builder
            .body(html.to_string())
            .map_err(|e| NotifyError::Build(e.to_string()))
    }

    /// Send one report
    pub async fn send(&self, subject: &str, html: &str) -> Result<(), NotifyError> {
        let message = self.build_message(subject, html)?;

        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.smtp_server)?
                .port(self.settings.smtp_port);
        if let (Some(user), Some(password)) =
            (&self.settings.smtp_user, &self.settings.smtp_password)
        {
            transport = transport.credentials(Credentials::new(user.clone(), password.clone()));
        }
        let mailer = transport.build();

        tracing::info!(
            from = %self.settings.from,
            to = %self.settings.to,
            server = %self.settings.smtp_server,
            "Sending report"
        );
        tokio::time::timeout(self.settings.timeout, mailer.send(message))
            .await
            .map_err(|_| NotifyError::Timeout(self.settings.timeout))??;

        tracing::info!(subject, "Report sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MachineId;
    use crate::report::{AlertCollector, DeviationRecord, Direction};
    use crate::sample::LatencySample;

    fn alerts(regressions: usize, improvements: usize) -> AlertReport {
        let mut collector = AlertCollector::new();
        let record = |direction| DeviationRecord {
            source: MachineId::new("a", "paris"),
            target: MachineId::new("b", "london"),
            current: LatencySample::UNAVAILABLE,
            baseline: LatencySample::UNAVAILABLE,
            direction,
        };
        for _ in 0..regressions {
            collector.record(record(Direction::Regressed));
        }
        for _ in 0..improvements {
            collector.record(record(Direction::Improved));
        }
        collector.finish()
    }

    fn settings(to: &str) -> MailSettings {
        MailSettings {
            from: "linkrtt@example.com".to_string(),
            to: to.to_string(),
            smtp_server: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_should_notify() {
        assert!(!should_notify(false, &alerts(0, 0)));
        assert!(should_notify(true, &alerts(0, 0)));
        assert!(should_notify(false, &alerts(1, 0)));
        assert!(should_notify(false, &alerts(0, 1)));
    }

    #[test]
    fn test_subject_plurals() {
        assert_eq!(
            subject(&alerts(1, 0)),
            "[ALERT][Network Lines] 1 regression - 0 improvement"
        );
        assert_eq!(
            subject(&alerts(2, 3)),
            "[ALERT][Network Lines] 2 regressions - 3 improvements"
        );
        assert_eq!(
            subject(&alerts(0, 1)),
            "[ALERT][Network Lines] 0 regression - 1 improvement"
        );
    }

    #[test]
    fn test_build_message_is_html() {
        let notifier = EmailNotifier::new(settings("ops@example.com, noc@example.com"));
        let message = notifier
            .build_message("[INFO][Network Lines] 0 regression - 0 improvement", "<p>ok</p>")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: [INFO][Network Lines] 0 regression - 0 improvement"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("ops@example.com"));
        assert!(raw.contains("noc@example.com"));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let notifier = EmailNotifier::new(settings("not-an-email"));
        assert!(matches!(
            notifier.build_message("s", "b"),
            Err(NotifyError::Address(_))
        ));
    }

    #[test]
    fn test_build_message_requires_recipient() {
        let notifier = EmailNotifier::new(settings(" , "));
        assert!(matches!(
            notifier.build_message("s", "b"),
            Err(NotifyError::Build(_))
        ));
    }
}

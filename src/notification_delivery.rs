// =============================================================================
// Notification delivery — email batching and the outbound transport seam
// =============================================================================
//
// The user directory (email address, per-account notification preference)
// and the SMTP/Twilio transport are both out of scope for this repo — they
// are modeled as narrow trait seams so the evaluator has a real collaborator
// to call. `LoggingEmailSender` and `NullUserDirectory` are the default,
// test-friendly implementations; a real deployment supplies its own.
// =============================================================================

use async_trait::async_trait;
use tracing::{info, warn};

/// Resolves a user id to the contact details needed for email delivery.
/// Out of scope: backed by a real `users` table in a full deployment.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn email_contact(&self, user_id: i64) -> Option<UserEmailContact>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserEmailContact {
    pub email: String,
    /// Account-level opt-in; if false, no email is sent regardless of any
    /// individual alert's `notify_email` flag.
    pub email_notifications_enabled: bool,
}

/// Default directory for a deployment with no `users` table wired up:
/// every lookup misses, so email batching is always skipped and alerts
/// still fire their in-app notification.
pub struct NullUserDirectory;

#[async_trait]
impl UserDirectory for NullUserDirectory {
    async fn email_contact(&self, _user_id: i64) -> Option<UserEmailContact> {
        None
    }
}

/// Outbound email transport seam. A real deployment plugs in SMTP or a
/// provider API; `LoggingEmailSender` just logs and reports success so the
/// batching logic above it is fully exercised without network access.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, plain: &str, html: &str) -> anyhow::Result<()>;
}

pub struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(&self, to: &str, subject: &str, plain: &str, _html: &str) -> anyhow::Result<()> {
        info!(to, subject, body = plain, "email delivery (logging sender, no transport configured)");
        Ok(())
    }
}

/// A triggered alert's data as carried through the per-user email batch,
/// mirroring the shape collected by the evaluator before a batch send.
#[derive(Debug, Clone)]
pub struct BatchedAlert {
    pub alert_id: i64,
    pub symbol: String,
    pub alert_kind: String,
    /// `AlertKind::action_phrase()` at trigger time, e.g. `"rose above"`.
    pub action_phrase: String,
    pub threshold_value: f64,
    pub trigger_price: f64,
    pub message: Option<String>,
    pub notify_email: bool,
}

/// Format a dollar amount with thousands grouping, e.g. `1500.0` ->
/// `"1,500.00"`, matching `f"${value:,.2f}"`.
pub fn format_money(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as i64;
    let whole = cents / 100;
    let fractional = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().rev().enumerate() {
        if i != 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    format!("{}{}.{:02}", if negative { "-" } else { "" }, grouped, fractional)
}

/// Build the email subject: a single symbol, or up to 3 symbols joined with
/// `", "` and an ellipsis suffix if more were involved.
pub fn build_subject(symbols: &[String]) -> String {
    let mut unique: Vec<&String> = Vec::new();
    for s in symbols {
        if !unique.contains(&s) {
            unique.push(s);
        }
    }
    if unique.len() == 1 {
        format!("Cortex Alert: {}", unique[0])
    } else {
        let head: Vec<&str> = unique.iter().take(3).map(|s| s.as_str()).collect();
        let suffix = if unique.len() > 3 { "..." } else { "" };
        format!("Cortex Alert: {}{}", head.join(", "), suffix)
    }
}

/// Build the plain-text body for a batch of triggered alerts.
pub fn build_plain_body(alerts: &[BatchedAlert]) -> String {
    let mut lines = vec![format!("Cortex - {} alert(s) triggered\n", alerts.len())];
    for a in alerts {
        lines.push(format!(
            "- {}: ${} ({} threshold ${})",
            a.symbol,
            format_money(a.trigger_price),
            a.alert_kind,
            format_money(a.threshold_value)
        ));
    }
    lines.join("\n")
}

/// Build a minimal HTML body for a batch of triggered alerts.
pub fn build_html_body(alerts: &[BatchedAlert]) -> String {
    let mut rows = String::new();
    for a in alerts {
        rows.push_str(&format!(
            "<li>{}: ${} ({} threshold ${})</li>",
            a.symbol,
            format_money(a.trigger_price),
            a.alert_kind,
            format_money(a.threshold_value)
        ));
    }
    format!(
        "<p>Cortex - {} alert(s) triggered</p><ul>{}</ul>",
        alerts.len(),
        rows
    )
}

/// Send one batched email to `user_id` covering `alerts` that requested
/// email notification, retrying the send up to 3 times. Returns `true` if
/// the send ultimately succeeded (and thus notifications should be marked
/// as sent), `false` if every attempt failed or the user has opted out.
pub async fn send_batched_email(
    directory: &dyn UserDirectory,
    sender: &dyn EmailSender,
    user_id: i64,
    alerts: &[BatchedAlert],
) -> bool {
    let email_alerts: Vec<&BatchedAlert> = alerts.iter().filter(|a| a.notify_email).collect();
    if email_alerts.is_empty() {
        return false;
    }

    let contact = match directory.email_contact(user_id).await {
        Some(c) if c.email_notifications_enabled => c,
        _ => return false,
    };

    let symbols: Vec<String> = email_alerts.iter().map(|a| a.symbol.clone()).collect();
    let subject = build_subject(&symbols);
    let owned: Vec<BatchedAlert> = email_alerts.into_iter().cloned().collect();
    let plain = build_plain_body(&owned);
    let html = build_html_body(&owned);

    for attempt in 1..=3 {
        match sender.send(&contact.email, &subject, &plain, &html).await {
            Ok(()) => return true,
            Err(e) => warn!(user_id, attempt, error = %e, "email retry"),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_single_symbol() {
        assert_eq!(build_subject(&["AAPL".to_string()]), "Cortex Alert: AAPL");
    }

    #[test]
    fn subject_multiple_symbols_truncates_to_three() {
        let symbols = vec![
            "AAPL".to_string(),
            "MSFT".to_string(),
            "TSLA".to_string(),
            "NVDA".to_string(),
        ];
        assert_eq!(build_subject(&symbols), "Cortex Alert: AAPL, MSFT, TSLA...");
    }

    #[test]
    fn subject_three_symbols_no_ellipsis() {
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string(), "TSLA".to_string()];
        assert_eq!(build_subject(&symbols), "Cortex Alert: AAPL, MSFT, TSLA");
    }

    fn sample_alert(symbol: &str, notify_email: bool) -> BatchedAlert {
        BatchedAlert {
            alert_id: 1,
            symbol: symbol.to_string(),
            alert_kind: "price_above".to_string(),
            action_phrase: "rose above".to_string(),
            threshold_value: 150.0,
            trigger_price: 151.0,
            message: None,
            notify_email,
        }
    }

    #[test]
    fn format_money_groups_thousands() {
        assert_eq!(format_money(1500.0), "1,500.00");
        assert_eq!(format_money(150.0), "150.00");
        assert_eq!(format_money(999.999), "1,000.00");
        assert_eq!(format_money(1_234_567.5), "1,234,567.50");
    }

    #[test]
    fn format_money_handles_negative_and_zero() {
        assert_eq!(format_money(0.0), "0.00");
        assert_eq!(format_money(-1500.5), "-1,500.50");
    }

    #[test]
    fn plain_body_groups_thousands() {
        let alert = BatchedAlert {
            alert_id: 1,
            symbol: "AAPL".to_string(),
            alert_kind: "price_above".to_string(),
            action_phrase: "rose above".to_string(),
            threshold_value: 1500.0,
            trigger_price: 1600.0,
            message: None,
            notify_email: true,
        };
        let body = build_plain_body(&[alert]);
        assert!(body.contains("$1,600.00"));
        assert!(body.contains("$1,500.00"));
    }

    struct StubDirectory(Option<UserEmailContact>);

    #[async_trait]
    impl UserDirectory for StubDirectory {
        async fn email_contact(&self, _user_id: i64) -> Option<UserEmailContact> {
            self.0.clone()
        }
    }

    struct FailingSender;

    #[async_trait]
    impl EmailSender for FailingSender {
        async fn send(&self, _to: &str, _subject: &str, _plain: &str, _html: &str) -> anyhow::Result<()> {
            anyhow::bail!("transport unavailable")
        }
    }

    #[tokio::test]
    async fn skips_alerts_not_opted_into_email() {
        let directory = StubDirectory(Some(UserEmailContact {
            email: "user@example.com".to_string(),
            email_notifications_enabled: true,
        }));
        let alerts = vec![sample_alert("AAPL", false)];
        let sent = send_batched_email(&directory, &LoggingEmailSender, 1, &alerts).await;
        assert!(!sent);
    }

    #[tokio::test]
    async fn skips_when_account_opted_out() {
        let directory = StubDirectory(Some(UserEmailContact {
            email: "user@example.com".to_string(),
            email_notifications_enabled: false,
        }));
        let alerts = vec![sample_alert("AAPL", true)];
        let sent = send_batched_email(&directory, &LoggingEmailSender, 1, &alerts).await;
        assert!(!sent);
    }

    #[tokio::test]
    async fn sends_via_logging_sender_when_opted_in() {
        let directory = StubDirectory(Some(UserEmailContact {
            email: "user@example.com".to_string(),
            email_notifications_enabled: true,
        }));
        let alerts = vec![sample_alert("AAPL", true)];
        let sent = send_batched_email(&directory, &LoggingEmailSender, 1, &alerts).await;
        assert!(sent);
    }

    #[tokio::test]
    async fn reports_failure_after_all_retries_exhausted() {
        let directory = StubDirectory(Some(UserEmailContact {
            email: "user@example.com".to_string(),
            email_notifications_enabled: true,
        }));
        let alerts = vec![sample_alert("AAPL", true)];
        let sent = send_batched_email(&directory, &FailingSender, 1, &alerts).await;
        assert!(!sent);
    }
}

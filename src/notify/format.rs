//! Bounded-length rendering of operator notifications.

use crate::domain::PendingNotification;

/// Room kept free for the fenced block and ellipsis around the detail
const DETAIL_RESERVE: usize = 100;

const ELLIPSIS: &str = "...";

/// Take at most `max_chars` characters, appending `...` when cut
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{}", &text[..byte_index], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Render a notification so the whole text stays within `max_length` characters.
///
/// The detail section is truncated first; if the text is still too long it is
/// hard-truncated as a whole.
pub fn format_notification(notification: &PendingNotification, max_length: usize) -> String {
    let mut text = format!(
        "{} **{}** | {}\n\n",
        notification.severity.marker(),
        notification.severity.as_str(),
        notification.created_at.format("%d.%m.%Y %H:%M:%S")
    );

    if let Some(context) = notification.context.as_deref().filter(|c| !c.is_empty()) {
        text.push_str(&format!("**Context:** {}\n\n", context));
    }

    text.push_str(&format!("**Error:** {}\n\n", notification.summary));

    if let Some(detail) = notification.detail.as_deref().filter(|d| !d.is_empty()) {
        text.push_str("**Details:**\n");
        let budget = max_length
            .saturating_sub(text.chars().count())
            .saturating_sub(DETAIL_RESERVE);
        text.push_str("```\n");
        text.push_str(&truncate_chars(detail, budget));
        text.push_str("\n```\n");
    }

    if text.chars().count() > max_length {
        // No room for an ellipsis
        if max_length <= ELLIPSIS.len() {
            return text.chars().take(max_length).collect();
        }
        let keep = max_length.saturating_sub(ELLIPSIS.len());
        let mut cut: String = text.chars().take(keep).collect();
        cut.push_str(ELLIPSIS);
        return cut;
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PendingNotification, Severity};

    #[test]
    fn test_sections_in_order() {
        let notification = PendingNotification::new(Severity::Critical, "cannot create notes root")
            .with_context("orchestrator.start")
            .with_detail("Permission denied (os error 13)");

        let text = format_notification(&notification, 4000);

        assert!(text.starts_with("🚨 **CRITICAL** | "));
        let context_at = text.find("**Context:** orchestrator.start").unwrap();
        let error_at = text.find("**Error:** cannot create notes root").unwrap();
        let detail_at = text.find("Permission denied").unwrap();
        assert!(context_at < error_at && error_at < detail_at);
    }

    #[test]
    fn test_long_detail_is_truncated_first() {
        let notification = PendingNotification::new(Severity::Error, "short summary")
            .with_detail("x".repeat(10_000));

        let text = format_notification(&notification, 500);

        assert!(text.chars().count() <= 500);
        assert!(text.contains("**Error:** short summary"));
        assert!(text.contains("...\n```"));
    }

    #[test]
    fn test_whole_body_hard_truncated() {
        let notification = PendingNotification::new(Severity::Error, "é".repeat(1_000));

        let text = format_notification(&notification, 200);

        assert_eq!(text.chars().count(), 200);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_tiny_limit_is_never_exceeded() {
        let notification = PendingNotification::new(Severity::Error, "boom");

        for max_length in 0..=4 {
            let text = format_notification(&notification, max_length);
            assert_eq!(text.chars().count(), max_length);
        }
    }

    #[test]
    fn test_truncate_chars_respects_utf8() {
        assert_eq!(truncate_chars("привет", 3), "при...");
        assert_eq!(truncate_chars("ok", 5), "ok");
    }
}

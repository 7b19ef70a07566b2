use serde::Serialize;

use fieldreport_shared::ReportError;

pub const EVENT_ALERT: &str = "user-alert";
pub const EVENT_REPORT_SUBMITTED: &str = "report-submitted";

/// One-shot alert shown to the user after a failed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAlert {
    pub title: String,
    pub message: String,
}

impl UserAlert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn from_error(err: &ReportError) -> Self {
        let message = match err {
            ReportError::NotAuthenticated => "Please sign in to continue.".to_string(),
            ReportError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self::new(err.title(), message)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSubmittedPayload {
    pub id: String,
    pub category: String,
    pub has_image: bool,
}

/// Hand an event to the UI shell. Serialization failures are logged, never
/// raised.
pub fn emit_event<S: Serialize>(sink: &dyn Fn(&str, serde_json::Value), event: &str, payload: S) {
    match serde_json::to_value(payload) {
        Ok(value) => sink(event, value),
        Err(e) => tracing::error!(event, error = %e, "Failed to serialize event"),
    }
}

/// Emit the alert for `err` and log it.
pub fn alert(sink: &dyn Fn(&str, serde_json::Value), err: &ReportError) -> UserAlert {
    let alert = UserAlert::from_error(err);
    tracing::warn!(title = %alert.title, message = %alert.message, "alerting user");
    emit_event(sink, EVENT_ALERT, &alert);
    alert
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn alert_titles_follow_error_kind() {
        let alert = UserAlert::from_error(&ReportError::validation("Please enter a description"));
        assert_eq!(alert.title, "Check your report");
        assert_eq!(alert.message, "Please enter a description");

        let alert = UserAlert::from_error(&ReportError::Upload("timeout".into()));
        assert_eq!(alert.title, "Upload failed");
        assert!(alert.message.contains("timeout"));

        let alert = UserAlert::from_error(&ReportError::NotAuthenticated);
        assert_eq!(alert.title, "Sign in required");
    }

    #[test]
    fn alert_is_emitted_as_json() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: &str, value: serde_json::Value| {
            seen.lock().unwrap().push((event.to_string(), value));
        };
        alert(&sink, &ReportError::PermissionDenied("camera".into()));

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, EVENT_ALERT);
        assert_eq!(seen[0].1["title"], "Permission needed");
    }
}

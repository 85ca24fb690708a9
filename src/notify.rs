use crate::diff::Transition;
use crate::model::FutureState;
use notify_rust::{Notification, Urgency};

/// Shows a desktop notification for a run reaching a terminal state.
/// Returns the error message when the notification daemon refused it.
pub fn send_desktop(transition: &Transition) -> Option<String> {
    let (summary, icon, urgency) = match transition.to {
        FutureState::Resolved => ("Run succeeded", "dialog-information", Urgency::Normal),
        s if s.is_failure() => ("Run failed", "dialog-error", Urgency::Critical),
        FutureState::Canceled => ("Run canceled", "dialog-warning", Urgency::Normal),
        _ => ("Run finished", "dialog-information", Urgency::Normal),
    };

    Notification::new()
        .summary(summary)
        .body(&transition.title)
        .icon(icon)
        .urgency(urgency)
        .show()
        .err()
        .map(|e| format!("Desktop notification failed: {e}"))
}

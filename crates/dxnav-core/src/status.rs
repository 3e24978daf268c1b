use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::context::ProgressSink;
use crate::session::LoginState;

pub const IDLE_TEXT: &str = "$(cloud) DNAnexus";
pub const IDLE_TOOLTIP: &str = "DNAnexus Platform";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusText {
    pub text: String,
    pub tooltip: String,
}

impl StatusText {
    pub fn new(text: impl Into<String>, tooltip: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tooltip: tooltip.into(),
        }
    }

    pub fn idle() -> Self {
        Self::new(IDLE_TEXT, IDLE_TOOLTIP)
    }
}

struct Inner {
    tx: watch::Sender<StatusText>,
    idle: Mutex<StatusText>,
}

/// The single status control: login state when idle, progress while a
/// long-running operation is active. Front-ends render it by subscribing.
#[derive(Clone)]
pub struct StatusIndicator {
    inner: Arc<Inner>,
}

impl StatusIndicator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StatusText::idle());
        Self {
            inner: Arc::new(Inner {
                tx,
                idle: Mutex::new(StatusText::idle()),
            }),
        }
    }

    pub fn current(&self) -> StatusText {
        self.inner.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusText> {
        self.inner.tx.subscribe()
    }

    /// Back to the idle text for the last known login state.
    pub fn reset(&self) {
        let idle = self
            .inner
            .idle
            .lock()
            .map(|idle| idle.clone())
            .unwrap_or_else(|_| StatusText::idle());
        self.inner.tx.send_replace(idle);
    }

    pub fn set_login(&self, state: &LoginState) {
        let idle = match state {
            LoginState::LoggedIn(user) => {
                StatusText::new(IDLE_TEXT, format!("{IDLE_TOOLTIP}: logged in as {user}"))
            }
            LoginState::LoggedOut => {
                StatusText::new("$(cloud-offline) DNAnexus", "Not logged in to DNAnexus")
            }
            LoginState::Expired => {
                StatusText::new("$(warning) DNAnexus", "DNAnexus session expired")
            }
        };
        if let Ok(mut slot) = self.inner.idle.lock() {
            *slot = idle.clone();
        }
        self.inner.tx.send_replace(idle);
    }

    pub fn set_upload_progress(&self, processed: usize, total: usize) {
        let percent = progress_percent(processed, total);
        self.inner.tx.send_replace(StatusText::new(
            format!("$(cloud-upload) DNAnexus: {processed}/{total} ({percent}%)"),
            format!("Uploading {total} files to DNAnexus"),
        ));
    }

    pub fn set_busy(&self, message: &str) {
        self.inner.tx.send_replace(StatusText::new(
            format!("$(sync~spin) DNAnexus: {message}"),
            message,
        ));
    }
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for StatusIndicator {
    fn report(&self, message: &str, _increment: Option<f64>) {
        self.set_busy(message);
    }
}

/// Rounded share of `processed` in `total`, capped at 100.
pub fn progress_percent(processed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let done = processed.min(total) as f64;
    ((done / total as f64) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_rounded_and_capped() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(5, 4), 100);
        assert_eq!(progress_percent(0, 0), 0);
    }

    #[test]
    fn upload_progress_text() {
        let status = StatusIndicator::new();
        status.set_upload_progress(3, 4);
        assert_eq!(status.current().text, "$(cloud-upload) DNAnexus: 3/4 (75%)");
    }

    #[test]
    fn reset_returns_to_login_aware_idle() {
        let status = StatusIndicator::new();
        assert_eq!(status.current(), StatusText::idle());

        status.set_login(&LoginState::Expired);
        status.set_upload_progress(1, 2);
        status.reset();
        assert_eq!(status.current().text, "$(warning) DNAnexus");

        status.set_login(&LoginState::LoggedIn("alice".into()));
        assert_eq!(status.current().text, IDLE_TEXT);
        assert!(status.current().tooltip.contains("alice"));
    }

    #[tokio::test]
    async fn subscribers_see_updates() {
        let status = StatusIndicator::new();
        let mut rx = status.subscribe();
        status.set_busy("Deleted 1/4");
        rx.changed().await.unwrap();
        assert!(rx.borrow().text.ends_with("Deleted 1/4"));
    }
}

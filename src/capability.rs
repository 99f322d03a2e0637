//! Capability probe run before anything else is started.

use std::fmt;
use std::sync::Arc;

use crate::device::{NotificationPermission, Notifier, XrSystem};
use crate::models::SessionMode;
use crate::status::{StatusLine, StatusMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupportState {
    Supported,
    Unsupported(UnsupportedReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// No XR runtime at all.
    NoRuntime,
    /// Runtime exists but cannot host the requested mode.
    ModeUnsupported,
    /// The capability query itself failed.
    QueryFailed(String),
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuntime => write!(f, "no XR runtime"),
            Self::ModeUnsupported => write!(f, "session mode not supported"),
            Self::QueryFailed(e) => write!(f, "{}", e),
        }
    }
}

/// How the unsupported warning reached the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningChannel {
    Notification,
    Alert,
}

pub struct CapabilityProber {
    xr: Arc<dyn XrSystem>,
    notifier: Arc<dyn Notifier>,
    mode: SessionMode,
}

impl CapabilityProber {
    pub fn new(xr: Arc<dyn XrSystem>, notifier: Arc<dyn Notifier>, mode: SessionMode) -> Self {
        Self { xr, notifier, mode }
    }

    /// Check support. On `Unsupported` the warning is emitted exactly once,
    /// both on the status line and through a notification or alert.
    pub async fn probe(&self, status: &StatusLine) -> SupportState {
        let state = self.query().await;
        match &state {
            SupportState::Supported => {
                status.set(StatusMessage::Supported);
            }
            SupportState::Unsupported(reason) => {
                let message = match reason {
                    UnsupportedReason::NoRuntime => StatusMessage::XrUnavailable,
                    UnsupportedReason::ModeUnsupported => StatusMessage::ModeUnsupported,
                    UnsupportedReason::QueryFailed(e) => StatusMessage::ProbeFailed(e.clone()),
                };
                tracing::warn!(mode = self.mode.as_str(), ?reason, "Immersive session unavailable");
                let text = message.to_string();
                status.set(message);
                let channel = self.warn(&text).await;
                tracing::debug!(?channel, "Unsupported warning delivered");
            }
        }
        state
    }

    async fn query(&self) -> SupportState {
        if !self.xr.is_available() {
            return SupportState::Unsupported(UnsupportedReason::NoRuntime);
        }
        match self.xr.is_session_supported(self.mode).await {
            Ok(true) => SupportState::Supported,
            Ok(false) => SupportState::Unsupported(UnsupportedReason::ModeUnsupported),
            Err(e) => SupportState::Unsupported(UnsupportedReason::QueryFailed(e.to_string())),
        }
    }

    async fn warn(&self, text: &str) -> WarningChannel {
        if self.notifier.request_permission().await == NotificationPermission::Granted {
            match self.notifier.show("AR unavailable", text) {
                Ok(()) => return WarningChannel::Notification,
                Err(e) => tracing::debug!("Notification failed, falling back to alert: {}", e),
            }
        }
        self.notifier.alert(text);
        WarningChannel::Alert
    }
}

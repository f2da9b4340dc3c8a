//! Failure taxonomy for status polling and foreground actions

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// No response at all (connect failure, timeout, aborted body)
    #[error("No response from {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// Response arrived but the body is not the expected JSON shape
    #[error("Malformed payload from {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },

    /// 401, or no bearer token available
    #[error("Authentication rejected by {endpoint}")]
    Auth { endpoint: String },

    /// 503 / 504 / 408
    #[error("Server busy ({status}) at {endpoint}")]
    ServerBusy { status: u16, endpoint: String },

    /// Any other non-success status
    #[error("Request to {endpoint} failed with status {status}: {detail}")]
    Http {
        status: u16,
        endpoint: String,
        detail: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MonitorError {
    pub fn transport(endpoint: &str, message: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    pub fn protocol(endpoint: &str, message: impl ToString) -> Self {
        Self::Protocol {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Whether a background poll failure feeds the consecutive-error counter
    #[must_use]
    pub fn counts_toward_threshold(&self) -> bool {
        !self.is_auth()
    }

    /// Short diagnostic label used in logs
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "no_response",
            Self::Protocol { .. } => "malformed_payload",
            Self::Auth { .. } => "auth_rejected",
            Self::ServerBusy { .. } => "server_busy",
            Self::Http { .. } => "http_error",
            Self::Config(_) => "config",
        }
    }
}

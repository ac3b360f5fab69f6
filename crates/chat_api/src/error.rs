use std::fmt;
use std::time::Duration;

use agent_provider::ProviderError;
use reqwest::StatusCode;

#[derive(Debug)]
pub enum ChatApiError {
    InvalidHeader(String),
    Request(reqwest::Error),
    /// Non-success status with the response body verbatim.
    Status(StatusCode, String),
    /// Absolute request deadline elapsed.
    Timeout(Duration),
    /// Cancellation signal fired; carries visible text assembled so far.
    Cancelled {
        partial: String,
    },
}

impl ChatApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl fmt::Display for ChatApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, body) => write!(f, "HTTP {} {body}", status.as_u16()),
            Self::Timeout(timeout) => {
                write!(f, "request timed out after {}s", timeout.as_secs())
            }
            Self::Cancelled { .. } => write!(f, "request was cancelled"),
        }
    }
}

impl std::error::Error for ChatApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request(error) => Some(error),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChatApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<ChatApiError> for ProviderError {
    fn from(error: ChatApiError) -> Self {
        match error {
            ChatApiError::Cancelled { partial } => Self::Cancelled { partial },
            ChatApiError::Timeout(timeout) => Self::Timeout(timeout),
            ChatApiError::Status(status, body) => Self::Status {
                status: status.as_u16(),
                body,
            },
            other => Self::Transport(other.to_string()),
        }
    }
}

use std::fmt;

/// Error from a single HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Connection, DNS, TLS or body transfer failure.
    #[error("network error: {0}")]
    Network(String),
    /// The transport gave up waiting for the server.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// The request could not be built or sent at all.
    #[error("invalid request: {0}")]
    Request(String),
}

impl FetchError {
    /// Network-class errors are worth another attempt; malformed requests are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_builder() {
            Self::Request(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Why a generation was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// `AbortHandle::abort` was called.
    User,
    /// The per-generation timeout elapsed.
    Timeout { after_ms: u64 },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("cancelled by user"),
            Self::Timeout { after_ms } => write!(f, "timed out after {after_ms} ms"),
        }
    }
}

/// Terminal generation failure sent through `SlideEvent::Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum GenerationFailure {
    /// The agent could not be reached after every retry.
    #[error("network failure after {attempts} attempt(s): {message}")]
    Network { attempts: u32, message: String },
    /// The agent answered with a non-success status.
    #[error("agent responded with status {status}: {body}")]
    Http { status: u16, body: String },
    /// The response body failed mid-stream.
    #[error("stream read failed: {message}")]
    Stream { message: String },
    /// The request could not be formed or the event channel broke.
    #[error("protocol failure: {message}")]
    Protocol { message: String },
    /// The generation was cancelled before it finished.
    #[error("generation aborted: {reason}")]
    Aborted { reason: AbortReason },
}

impl GenerationFailure {
    pub(crate) fn from_fetch(err: FetchError, attempts: u32) -> Self {
        match err {
            FetchError::Network(message) | FetchError::Timeout(message) => {
                Self::Network { attempts, message }
            }
            FetchError::Request(message) => Self::Protocol { message },
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Human-readable explanation suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network { attempts, message } => format!(
                "Could not reach the slides agent after {attempts} attempt(s). \
                 Check your network connection, proxy or cross-origin settings. ({message})"
            ),
            Self::Http { status, body } if body.trim().is_empty() => {
                format!("The slides agent rejected the request (HTTP {status}).")
            }
            Self::Http { status, body } => {
                format!("The slides agent rejected the request (HTTP {status}): {}", body.trim())
            }
            Self::Stream { message } => {
                format!("The connection to the slides agent dropped while streaming: {message}")
            }
            Self::Protocol { message } => format!("Slide generation failed: {message}"),
            Self::Aborted {
                reason: AbortReason::User,
            } => "The request was aborted before the slides were finished.".to_string(),
            Self::Aborted {
                reason: AbortReason::Timeout { after_ms },
            } => format!(
                "The request was aborted because it did not finish within {} seconds.",
                after_ms / 1_000
            ),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Top-level error type for the public API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlidesError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid input to the builder API.
    #[error("validation error: {0}")]
    Validation(String),
    /// Terminal failure returned from a started generation.
    #[error(transparent)]
    GenerationFailed(GenerationFailure),
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<GenerationFailure> for SlidesError {
    fn from(value: GenerationFailure) -> Self {
        SlidesError::GenerationFailed(value)
    }
}

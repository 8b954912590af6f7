use crate::GenerationOutput;
use crate::errors::GenerationFailure;
use crate::extract::SlidePartial;

/// Events exposed by `GenerationStream`.
#[derive(Clone, Debug, PartialEq)]
pub enum SlideEvent {
    /// First event for every generation.
    Started { request_id: uuid::Uuid },
    /// A slide's buffer after one ingested chunk (live preview).
    Partial(SlidePartial),
    /// Progress or diagnostic line meant for the user.
    Log { message: String },
    /// Terminal success event.
    Completed {
        request_id: uuid::Uuid,
        output: GenerationOutput,
    },
    /// Terminal failure event.
    Error {
        request_id: uuid::Uuid,
        error: GenerationFailure,
    },
}

impl SlideEvent {
    pub(crate) fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}

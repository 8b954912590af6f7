use std::time::Duration;

use crate::http::RetryPolicy;

/// Per-generation behavior options.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GenerationOptions {
    /// Optional per-generation timeout. Elapsing it aborts the generation.
    pub timeout: Option<Duration>,
    /// Retry policy for establishing the agent response.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Bounded event buffer size used by the streaming channel.
    pub stream_buffer_capacity: usize,
    /// Keep the raw SSE text and return it with the output.
    #[serde(default)]
    pub capture_transcript: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            retry_policy: RetryPolicy::default(),
            stream_buffer_capacity: 128,
            capture_transcript: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = GenerationOptions::default();
        assert_eq!(options.stream_buffer_capacity, 128);
        assert_eq!(options.retry_policy.max_attempts, 3);
        assert!(options.timeout.is_none());
        assert!(!options.capture_transcript);
    }
}

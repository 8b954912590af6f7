use std::time::Duration;

use crate::errors::SlidesError;

pub const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn";
pub const DEFAULT_AGENT_ID: &str = "slides_glm_agent";

/// Configuration for the slides agent client.
#[derive(Clone, Debug)]
pub struct AgentClientConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL of the agent platform.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Agent identifier sent in every request body.
    pub agent_id: String,
    /// Connection establishment timeout. Streamed bodies are not time-limited
    /// here; use the per-generation timeout instead.
    pub connect_timeout: Duration,
}

impl AgentClientConfig {
    /// Creates a config with defaults and a provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            agent_id: DEFAULT_AGENT_ID.to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Builds a config from `SLIDES_AGENT_API_KEY`, with optional
    /// `SLIDES_AGENT_BASE_URL` and `SLIDES_AGENT_ID` overrides.
    pub fn from_env() -> Result<Self, SlidesError> {
        let api_key = std::env::var("SLIDES_AGENT_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(SlidesError::Config(
                "missing SLIDES_AGENT_API_KEY for the slides agent".into(),
            ));
        }
        let mut config = Self::new(api_key.trim());
        if let Some(base_url) = non_empty_env("SLIDES_AGENT_BASE_URL") {
            config = config.base_url(base_url);
        }
        if let Some(agent_id) = non_empty_env("SLIDES_AGENT_ID") {
            config = config.agent_id(agent_id);
        }
        Ok(config)
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn agents_url(&self) -> String {
        format!("{}/api/v1/agents", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn validate(&self) -> Result<(), SlidesError> {
        if self.api_key.trim().is_empty() {
            return Err(SlidesError::Config("api key must not be empty".into()));
        }
        if self.agent_id.trim().is_empty() {
            return Err(SlidesError::Config("agent id must not be empty".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(SlidesError::Config(format!(
                "base url must be http(s), got {:?}",
                self.base_url
            )));
        }
        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agents_url_ignores_trailing_slash() {
        let config = AgentClientConfig::new("k").base_url("http://localhost:8080/");
        assert_eq!(config.agents_url(), "http://localhost:8080/api/v1/agents");
        assert_eq!(
            AgentClientConfig::new("k").agents_url(),
            "https://open.bigmodel.cn/api/v1/agents"
        );
    }

    #[test]
    fn validation_rejects_blank_fields() {
        assert!(AgentClientConfig::new("k").validate().is_ok());
        assert!(AgentClientConfig::new(" ").validate().is_err());
        assert!(AgentClientConfig::new("k").agent_id("").validate().is_err());
        assert!(
            AgentClientConfig::new("k")
                .base_url("ftp://example.com")
                .validate()
                .is_err()
        );
    }
}

use std::sync::Arc;

use crate::config::AgentClientConfig;
use crate::errors::SlidesError;
use crate::http::{AgentHttp, ReqwestAgentHttp};
use crate::request::SlideDeckRequest;
use crate::run::GenerationBuilder;

/// Entry point for generating and editing slide decks.
///
/// Cloning is cheap; clones share the same HTTP transport.
#[derive(Clone)]
pub struct SlidesClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) config: AgentClientConfig,
    pub(crate) http: Arc<dyn AgentHttp>,
}

impl SlidesClient {
    /// Creates a client backed by reqwest.
    pub fn new(config: AgentClientConfig) -> Result<Self, SlidesError> {
        let http = ReqwestAgentHttp::new(config.connect_timeout)?;
        Self::with_http(config, Arc::new(http))
    }

    /// Creates a client from `SLIDES_AGENT_*` environment variables.
    pub fn from_env() -> Result<Self, SlidesError> {
        Self::new(AgentClientConfig::from_env()?)
    }

    /// Creates a client over a custom transport (proxies, tests).
    pub fn with_http(
        config: AgentClientConfig,
        http: Arc<dyn AgentHttp>,
    ) -> Result<Self, SlidesError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ClientInner { config, http }),
        })
    }

    pub fn config(&self) -> &AgentClientConfig {
        &self.inner.config
    }

    /// Starts configuring a new deck from `prompt`.
    pub fn generate(&self, prompt: impl Into<String>) -> GenerationBuilder {
        GenerationBuilder::new(self.inner.clone(), SlideDeckRequest::new(prompt))
    }

    /// Starts configuring an edit of a deck produced in `conversation_id`.
    pub fn update(
        &self,
        conversation_id: impl Into<String>,
        instruction: impl Into<String>,
    ) -> GenerationBuilder {
        GenerationBuilder::new(
            self.inner.clone(),
            SlideDeckRequest::new(instruction).conversation_id(conversation_id),
        )
    }

    /// Starts a generation from a fully specified request.
    pub fn request(&self, request: SlideDeckRequest) -> GenerationBuilder {
        GenerationBuilder::new(self.inner.clone(), request)
    }
}

impl std::fmt::Debug for SlidesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidesClient")
            .field("base_url", &self.inner.config.base_url)
            .field("agent_id", &self.inner.config.agent_id)
            .finish_non_exhaustive()
    }
}

//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, AgentClientConfig, GeneratedSlide, GenerationBuilder, GenerationFailure,
    GenerationOutput, GenerationStream, RetryPolicy, SlideDeckRequest, SlideEvent, SlidePartial,
    SlidesClient, SlidesError,
};

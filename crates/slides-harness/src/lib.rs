//! Streaming client for a remote slide-deck generation agent.
//!
//! The agent answers with Server-Sent Events in which slides arrive as
//! incremental tool-call snapshots. This crate frames the stream, extracts
//! per-slide HTML while it grows, and assembles a complete document for every
//! slide once the stream ends.
//!
//! ```no_run
//! use slides_harness::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), SlidesError> {
//! let client = SlidesClient::from_env()?;
//! let mut stream = client
//!     .generate("Five slides introducing Rust ownership")
//!     .start_stream()
//!     .await?;
//!
//! while let Some(event) = stream.next_event().await {
//!     if let SlideEvent::Partial(partial) = event {
//!         println!("slide {}: {} bytes", partial.position, partial.html.len());
//!     }
//! }
//! let output = stream.finish().await?;
//! println!("{} slides", output.slides.len());
//! # Ok(())
//! # }
//! ```

/// Final slide documents built from extraction buffers.
pub mod assembly;
/// Client entry point.
pub mod client;
/// Agent endpoint configuration.
pub mod config;
/// Byte-level stream consumer feeding the extraction state.
pub mod consumer;
/// Public error types.
pub mod errors;
/// Incremental per-slide extraction from agent payloads.
pub mod extract;
/// Retrying fetch and the agent HTTP transport.
pub mod http;
/// Process-wide logging setup.
pub mod observability;
/// Per-generation options.
pub mod options;
/// Final generation output.
pub mod output;
/// Common imports for typical usage.
pub mod prelude;
/// Request body construction.
pub mod request;
/// Generation builder, streaming handle, and cancellation handle.
pub mod run;
/// Server-Sent Events framing.
pub mod sse;
/// Public stream events.
pub mod stream;

pub use assembly::{GeneratedSlide, finalize_slides};
pub use client::SlidesClient;
pub use config::AgentClientConfig;
pub use errors::{AbortReason, FetchError, GenerationFailure, SlidesError};
pub use extract::{ExtractionState, SlidePartial, walk_event};
pub use http::{AgentHttp, HttpResponse, ReqwestAgentHttp, RetryPolicy, fetch_with_retry};
pub use observability::init_observability;
pub use options::GenerationOptions;
pub use output::GenerationOutput;
pub use request::{SlideDeckRequest, build_request_body};
pub use run::{AbortHandle, GenerationBuilder, GenerationStream};
pub use sse::{FeedMode, SseEvent, SseFramer};
pub use stream::SlideEvent;

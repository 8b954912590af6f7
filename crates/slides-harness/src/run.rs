use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::GenerationOutput;
use crate::client::ClientInner;
use crate::consumer::StreamConsumer;
use crate::errors::{AbortReason, GenerationFailure, SlidesError};
use crate::http::{AgentHttp, RetryPolicy, fetch_with_retry};
use crate::options::GenerationOptions;
use crate::request::{SlideDeckRequest, build_request_body};
use crate::stream::SlideEvent;

/// Handle used to cancel a running generation.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The in-flight request or body read is dropped and the generation ends
    /// with a single `SlideEvent::Error` carrying `GenerationFailure::Aborted`.
    /// Calling this after the terminal event has no effect.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Builder for configuring and starting a single generation.
pub struct GenerationBuilder {
    client: Arc<ClientInner>,
    request: SlideDeckRequest,
    options: GenerationOptions,
}

impl GenerationBuilder {
    pub(crate) fn new(client: Arc<ClientInner>, request: SlideDeckRequest) -> Self {
        Self {
            client,
            request,
            options: GenerationOptions::default(),
        }
    }

    /// Continues an earlier conversation.
    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.request.conversation_id = Some(id.into());
        self
    }

    pub fn knowledge_base_id(mut self, id: impl Into<String>) -> Self {
        self.request.knowledge_base_id = Some(id.into());
        self
    }

    /// Aborts the generation with `AbortReason::Timeout` once `timeout` elapses.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.options.retry_policy = policy;
        self
    }

    /// Sets the bounded buffer size between the generation task and the consumer.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.stream_buffer_capacity = capacity;
        self
    }

    /// Returns the raw SSE text in `GenerationOutput::transcript`.
    pub fn capture_transcript(mut self, capture: bool) -> Self {
        self.options.capture_transcript = capture;
        self
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates the builder state and starts a streaming generation.
    ///
    /// The returned `GenerationStream` yields `Started`, any number of
    /// `Partial`/`Log` events, and exactly one `Completed` or `Error`.
    pub async fn start_stream(self) -> Result<GenerationStream, SlidesError> {
        if self.options.stream_buffer_capacity == 0 {
            return Err(SlidesError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        let body = build_request_body(&self.client.config.agent_id, &self.request)?;

        let (tx, rx) = mpsc::channel(self.options.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);

        let request_id = uuid::Uuid::new_v4();
        let job = Generation {
            request_id,
            http: self.client.http.clone(),
            url: self.client.config.agents_url(),
            api_key: self.client.config.api_key.clone(),
            body,
            requested_conversation_id: self.request.conversation_id,
            options: self.options,
        };
        tokio::spawn(run_task(job, tx, final_tx, abort_rx));

        Ok(GenerationStream {
            request_id,
            rx,
            final_rx,
            abort_handle: AbortHandle { tx: abort_tx },
            saw_terminal: false,
        })
    }

    /// Runs to completion and returns the final output.
    pub async fn collect(self) -> Result<GenerationOutput, SlidesError> {
        self.start_stream().await?.finish().await
    }
}

/// Streaming handle returned by `GenerationBuilder::start_stream`.
pub struct GenerationStream {
    request_id: uuid::Uuid,
    rx: mpsc::Receiver<SlideEvent>,
    final_rx: oneshot::Receiver<Result<GenerationOutput, SlidesError>>,
    abort_handle: AbortHandle,
    saw_terminal: bool,
}

impl GenerationStream {
    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    /// Returns a handle that can cancel the generation.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next event. Returns `None` once the channel is closed.
    pub async fn next_event(&mut self) -> Option<SlideEvent> {
        let event = self.rx.recv().await;
        if event.as_ref().is_some_and(SlideEvent::is_terminal) {
            self.saw_terminal = true;
        }
        event
    }

    /// Drains remaining events (if needed) and returns the terminal result.
    pub async fn finish(mut self) -> Result<GenerationOutput, SlidesError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(event) if event.is_terminal() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }

        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(SlidesError::Protocol(format!(
                "generation task ended without a final result (request_id={})",
                self.request_id
            ))),
        }
    }
}

struct Generation {
    request_id: uuid::Uuid,
    http: Arc<dyn AgentHttp>,
    url: String,
    api_key: String,
    body: serde_json::Value,
    requested_conversation_id: Option<String>,
    options: GenerationOptions,
}

async fn run_task(
    job: Generation,
    tx: mpsc::Sender<SlideEvent>,
    final_tx: oneshot::Sender<Result<GenerationOutput, SlidesError>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let request_id = job.request_id;
    if !send_event(&tx, SlideEvent::Started { request_id }).await {
        let _ = final_tx.send(Err(SlidesError::Protocol(
            "event receiver dropped before Started".into(),
        )));
        return;
    }
    info!(request_id = %request_id, url = %job.url, "slide generation started");

    let outcome = tokio::select! {
        result = drive_generation(&job, &tx) => result,
        reason = wait_for_abort(&mut abort_rx, job.options.timeout) => {
            Err(GenerationFailure::Aborted { reason })
        }
    };

    match outcome {
        Ok(output) => {
            info!(request_id = %request_id, slides = output.slides.len(), "slide generation completed");
            let sent = send_event(
                &tx,
                SlideEvent::Completed {
                    request_id,
                    output: output.clone(),
                },
            )
            .await;
            let _ = final_tx.send(if sent {
                Ok(output)
            } else {
                Err(SlidesError::Protocol(
                    "event receiver dropped before completion".into(),
                ))
            });
        }
        Err(failure) => {
            warn!(request_id = %request_id, error = %failure, "slide generation failed");
            let _ = send_event(
                &tx,
                SlideEvent::Error {
                    request_id,
                    error: failure.clone(),
                },
            )
            .await;
            let _ = final_tx.send(Err(SlidesError::GenerationFailed(failure)));
        }
    }
}

/// Resolves when the caller aborts or the timeout elapses.
async fn wait_for_abort(
    abort_rx: &mut watch::Receiver<bool>,
    timeout: Option<Duration>,
) -> AbortReason {
    let user = async {
        loop {
            if *abort_rx.borrow_and_update() {
                return;
            }
            if abort_rx.changed().await.is_err() {
                // every AbortHandle is gone; only the timeout can fire now
                std::future::pending::<()>().await;
            }
        }
    };

    match timeout {
        Some(after) => tokio::select! {
            _ = user => AbortReason::User,
            _ = tokio::time::sleep(after) => AbortReason::Timeout {
                after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
            },
        },
        None => {
            user.await;
            AbortReason::User
        }
    }
}

async fn drive_generation(
    job: &Generation,
    tx: &mpsc::Sender<SlideEvent>,
) -> Result<GenerationOutput, GenerationFailure> {
    let request_id = job.request_id;
    let http = job.http.as_ref();
    let (url, api_key, body) = (job.url.as_str(), job.api_key.as_str(), &job.body);

    forward(tx, vec![SlideEvent::log("Requesting slides from the agent")]).await?;

    let mut attempts = 0;
    let fetched = fetch_with_retry(&job.options.retry_policy, |attempt| {
        attempts = attempt;
        if attempt > 1 {
            let _ = tx.try_send(SlideEvent::log(format!("Retrying agent request (attempt {attempt})")));
        }
        debug!(request_id = %request_id, attempt, "posting to agent");
        http.post_stream(url, api_key, body)
    })
    .await;
    let response = fetched.map_err(|err| GenerationFailure::from_fetch(err, attempts))?;

    if !response.is_success() {
        let status = response.status;
        let body = response.into_text().await;
        return Err(GenerationFailure::Http { status, body });
    }
    debug!(request_id = %request_id, status = response.status, content_type = ?response.content_type, "agent stream opened");

    let mut consumer = StreamConsumer::new(job.options.capture_transcript);
    let mut body = response.body;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| GenerationFailure::Stream {
            message: err.to_string(),
        })?;
        forward(tx, consumer.push_bytes(&chunk)).await?;
        if consumer.is_done() {
            break;
        }
    }
    drop(body);
    forward(tx, consumer.finish()).await?;

    let output = consumer.into_output(job.requested_conversation_id.clone());
    if output.is_empty() {
        info!(request_id = %request_id, "agent finished without slides");
        forward(tx, vec![SlideEvent::log("The agent finished without producing any slides")])
            .await?;
    }
    Ok(output)
}

async fn forward(
    tx: &mpsc::Sender<SlideEvent>,
    events: Vec<SlideEvent>,
) -> Result<(), GenerationFailure> {
    for event in events {
        if !send_event(tx, event).await {
            return Err(GenerationFailure::protocol("event receiver dropped"));
        }
    }
    Ok(())
}

async fn send_event(tx: &mpsc::Sender<SlideEvent>, event: SlideEvent) -> bool {
    tx.send(event).await.is_ok()
}

//! Hosted assistant backend abstraction
//!
//! One trait covers the three calls a session needs: create a thread, post a
//! question (returning the run's event stream), and answer tool calls
//! (returning the continuation stream).

mod error;
mod openai;
mod stream;
mod types;

pub use error::{BackendError, BackendErrorKind};
pub use openai::{AssistantIds, OpenAiAssistants};
pub use types::*;

use crate::state_machine::state::Topic;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// Events of one streamed run, in arrival order
pub type EventStream = Pin<Box<dyn Stream<Item = Result<AssistantEvent, BackendError>> + Send>>;

#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn create_thread(&self) -> Result<ThreadHandle, BackendError>;

    async fn post_message(
        &self,
        thread: &ThreadHandle,
        text: &str,
        topic: Option<Topic>,
    ) -> Result<EventStream, BackendError>;

    async fn submit_tool_outputs(
        &self,
        thread: &ThreadHandle,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<EventStream, BackendError>;

    /// Fetch a file produced by the assistant (images, generated data)
    async fn file_content(&self, file_id: &str) -> Result<FileContent, BackendError>;
}

#[async_trait]
impl<T: AssistantBackend + ?Sized> AssistantBackend for Arc<T> {
    async fn create_thread(&self) -> Result<ThreadHandle, BackendError> {
        (**self).create_thread().await
    }

    async fn post_message(
        &self,
        thread: &ThreadHandle,
        text: &str,
        topic: Option<Topic>,
    ) -> Result<EventStream, BackendError> {
        (**self).post_message(thread, text, topic).await
    }

    async fn submit_tool_outputs(
        &self,
        thread: &ThreadHandle,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<EventStream, BackendError> {
        (**self).submit_tool_outputs(thread, run_id, outputs).await
    }

    async fn file_content(&self, file_id: &str) -> Result<FileContent, BackendError> {
        (**self).file_content(file_id).await
    }
}

/// Logging wrapper for assistant backends
pub struct LoggingBackend<B> {
    inner: B,
}

impl<B: AssistantBackend> LoggingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: AssistantBackend> AssistantBackend for LoggingBackend<B> {
    async fn create_thread(&self) -> Result<ThreadHandle, BackendError> {
        let result = self.inner.create_thread().await;
        match &result {
            Ok(thread) => tracing::info!(thread = %thread, "Created assistant thread"),
            Err(e) => tracing::error!(error = %e.message, kind = ?e.kind, "Thread creation failed"),
        }
        result
    }

    async fn post_message(
        &self,
        thread: &ThreadHandle,
        text: &str,
        topic: Option<Topic>,
    ) -> Result<EventStream, BackendError> {
        let start = std::time::Instant::now();
        let result = self.inner.post_message(thread, text, topic).await;
        let duration = start.elapsed();
        match &result {
            Ok(_) => tracing::info!(
                thread = %thread,
                topic = ?topic,
                duration_ms = %duration.as_millis(),
                "Run stream opened"
            ),
            Err(e) => tracing::error!(
                thread = %thread,
                topic = ?topic,
                duration_ms = %duration.as_millis(),
                error = %e.message,
                retryable = e.kind.is_retryable(),
                "Posting question failed"
            ),
        }
        result
    }

    async fn submit_tool_outputs(
        &self,
        thread: &ThreadHandle,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<EventStream, BackendError> {
        let result = self.inner.submit_tool_outputs(thread, run_id, outputs).await;
        match &result {
            Ok(_) => tracing::info!(
                thread = %thread,
                run_id,
                count = outputs.len(),
                "Submitted tool outputs"
            ),
            Err(e) => tracing::error!(
                thread = %thread,
                run_id,
                error = %e.message,
                "Submitting tool outputs failed"
            ),
        }
        result
    }

    async fn file_content(&self, file_id: &str) -> Result<FileContent, BackendError> {
        let result = self.inner.file_content(file_id).await;
        if let Err(e) = &result {
            tracing::warn!(file_id, error = %e.message, "File fetch failed");
        }
        result
    }
}

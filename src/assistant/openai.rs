//! `OpenAI` Assistants (v2) backend

use super::stream::event_stream;
use super::types::{FileContent, ThreadHandle, ToolOutput};
use super::{AssistantBackend, BackendError, EventStream};
use crate::state_machine::state::Topic;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Assistant ids per topic. `default` answers when no topic is selected and
/// backs any topic without its own id.
#[derive(Debug, Clone, Default)]
pub struct AssistantIds {
    pub default: Option<String>,
    pub subject: Option<String>,
    pub rules: Option<String>,
    pub schedule: Option<String>,
}

impl AssistantIds {
    pub fn for_topic(&self, topic: Option<Topic>) -> Option<&str> {
        let specific = match topic {
            Some(Topic::Subject) => self.subject.as_deref(),
            Some(Topic::Rules) => self.rules.as_deref(),
            Some(Topic::Schedule) => self.schedule.as_deref(),
            None => None,
        };
        specific.or(self.default.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Serialize)]
struct SubmitToolOutputsRequest<'a> {
    tool_outputs: &'a [ToolOutput],
    stream: bool,
}

pub struct OpenAiAssistants {
    client: Client,
    api_key: String,
    base_url: String,
    assistants: AssistantIds,
}

impl OpenAiAssistants {
    pub fn new(api_key: String, assistants: AssistantIds) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BackendError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            assistants,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send(request: reqwest::RequestBuilder) -> Result<Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::from_status(status.as_u16(), &body))
    }

    async fn stream(request: reqwest::RequestBuilder) -> Result<EventStream, BackendError> {
        let response = Self::send(request.header("Accept", "text/event-stream")).await?;
        Ok(event_stream(response.bytes_stream()))
    }
}

#[async_trait]
impl AssistantBackend for OpenAiAssistants {
    async fn create_thread(&self) -> Result<ThreadHandle, BackendError> {
        let response = Self::send(self.post("/threads").json(&json!({}))).await?;
        let thread: ThreadObject = response
            .json()
            .await
            .map_err(|e| BackendError::malformed(format!("Invalid thread response: {e}")))?;
        Ok(ThreadHandle(thread.id))
    }

    async fn post_message(
        &self,
        thread: &ThreadHandle,
        text: &str,
        topic: Option<Topic>,
    ) -> Result<EventStream, BackendError> {
        let assistant_id = self.assistants.for_topic(topic).ok_or_else(|| {
            BackendError::config(format!(
                "No assistant configured for topic {}",
                topic.map_or("none", Topic::as_str)
            ))
        })?;

        Self::send(
            self.post(&format!("/threads/{thread}/messages"))
                .json(&json!({ "role": "user", "content": text })),
        )
        .await?;

        Self::stream(
            self.post(&format!("/threads/{thread}/runs"))
                .json(&json!({ "assistant_id": assistant_id, "stream": true })),
        )
        .await
    }

    async fn submit_tool_outputs(
        &self,
        thread: &ThreadHandle,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<EventStream, BackendError> {
        Self::stream(
            self.post(&format!(
                "/threads/{thread}/runs/{run_id}/submit_tool_outputs"
            ))
            .json(&SubmitToolOutputsRequest {
                tool_outputs: outputs,
                stream: true,
            }),
        )
        .await
    }

    async fn file_content(&self, file_id: &str) -> Result<FileContent, BackendError> {
        let request = self
            .client
            .get(format!("{}/files/{file_id}/content", self.base_url))
            .bearer_auth(&self.api_key);
        let response = Self::send(request).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::network(format!("Failed to read file: {e}")))?;
        Ok(FileContent {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

//! Decoding of the Assistants server-sent event stream

use super::error::BackendError;
use super::types::{AssistantEvent, FileAnnotation, ToolCallKind, ToolCallRequest};
use super::EventStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

/// One `event:`/`data:` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental SSE frame splitter. Bytes may arrive split anywhere,
/// including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_block(&String::from_utf8_lossy(&block)) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();
    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }
    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseFrame {
        event: event.unwrap_or_else(|| "message".to_string()),
        data: data.join("\n"),
    })
}

/// Result of decoding one frame
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    Events(Vec<AssistantEvent>),
    /// The backend signalled end of stream
    Done,
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn array_at<'a>(value: &'a Value, pointer: &str) -> &'a [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

/// Map one frame onto typed events
pub fn decode_frame(frame: &SseFrame) -> Result<Decoded, BackendError> {
    if frame.event == "done" || frame.data == "[DONE]" {
        return Ok(Decoded::Done);
    }

    let data: Value = serde_json::from_str(&frame.data).map_err(|e| {
        BackendError::malformed(format!("Invalid JSON in '{}' event: {e}", frame.event))
    })?;

    let events = match frame.event.as_str() {
        "thread.message.created" => vec![AssistantEvent::TextCreated],

        "thread.message.delta" => array_at(&data, "/delta/content")
            .iter()
            .filter(|part| str_at(part, "/type") == Some("text"))
            .map(|part| AssistantEvent::TextDelta {
                value: str_at(part, "/text/value").unwrap_or_default().to_string(),
                annotations: array_at(part, "/text/annotations")
                    .iter()
                    .filter(|a| str_at(a, "/type") == Some("file_path"))
                    .filter_map(|a| {
                        Some(FileAnnotation {
                            text: str_at(a, "/text")?.to_string(),
                            file_id: str_at(a, "/file_path/file_id")?.to_string(),
                        })
                    })
                    .collect(),
            })
            .collect(),

        "thread.message.completed" => array_at(&data, "/content")
            .iter()
            .filter_map(|part| match str_at(part, "/type") {
                Some("text") => Some(AssistantEvent::TextDone {
                    text: str_at(part, "/text/value").unwrap_or_default().to_string(),
                }),
                Some("image_file") => Some(AssistantEvent::ImageFile {
                    file_id: str_at(part, "/image_file/file_id")?.to_string(),
                }),
                _ => None,
            })
            .collect(),

        "thread.run.step.delta" => {
            let mut events = Vec::new();
            for call in array_at(&data, "/delta/step_details/tool_calls") {
                let Some(kind) = str_at(call, "/type").and_then(ToolCallKind::parse) else {
                    continue;
                };
                if let Some(id) = str_at(call, "/id") {
                    events.push(AssistantEvent::ToolCallCreated {
                        id: id.to_string(),
                        kind,
                    });
                }
                if let Some(input) = str_at(call, "/code_interpreter/input") {
                    if !input.is_empty() {
                        events.push(AssistantEvent::ToolCallDelta {
                            kind,
                            input: input.to_string(),
                        });
                    }
                }
            }
            events
        }

        "thread.run.requires_action" => {
            let run_id = str_at(&data, "/id")
                .ok_or_else(|| BackendError::malformed("requires_action without run id"))?
                .to_string();
            let tool_calls = array_at(&data, "/required_action/submit_tool_outputs/tool_calls")
                .iter()
                .filter_map(|call| {
                    Some(ToolCallRequest {
                        id: str_at(call, "/id")?.to_string(),
                        name: str_at(call, "/function/name")?.to_string(),
                        arguments: str_at(call, "/function/arguments")
                            .unwrap_or("{}")
                            .to_string(),
                    })
                })
                .collect();
            vec![AssistantEvent::ActionRequired { run_id, tool_calls }]
        }

        "thread.run.completed" => vec![AssistantEvent::RunCompleted],

        "thread.run.failed" | "thread.run.cancelled" | "thread.run.expired" => {
            let message = str_at(&data, "/last_error/message")
                .map_or_else(|| frame.event.clone(), str::to_string);
            vec![AssistantEvent::RunFailed { message }]
        }

        "error" => {
            let message = str_at(&data, "/message")
                .or_else(|| str_at(&data, "/error/message"))
                .unwrap_or("backend reported an error")
                .to_string();
            vec![AssistantEvent::RunFailed { message }]
        }

        other => vec![AssistantEvent::Unknown {
            name: other.to_string(),
        }],
    };

    Ok(Decoded::Events(events))
}

struct Decoding<S> {
    inner: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<AssistantEvent, BackendError>>,
    finished: bool,
}

/// Turn a byte stream of SSE into typed assistant events.
///
/// The stream ends after `done`, after the first error, or when the
/// underlying body ends.
pub fn event_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = Decoding {
        inner: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    for frame in st.decoder.push(chunk.as_ref()) {
                        match decode_frame(&frame) {
                            Ok(Decoded::Events(events)) => {
                                st.pending.extend(events.into_iter().map(Ok));
                            }
                            Ok(Decoded::Done) => {
                                st.finished = true;
                                break;
                            }
                            Err(e) => {
                                st.pending.push_back(Err(e));
                                st.finished = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.pending
                        .push_back(Err(BackendError::network(format!("Stream read failed: {e}"))));
                    st.finished = true;
                }
                None => st.finished = true,
            }
        }
    }))
}

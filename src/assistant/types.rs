//! Assistant backend types

use serde::{Deserialize, Serialize};

/// Opaque reference to a backend conversation thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadHandle(pub String);

impl std::fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of tool call reported while a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallKind {
    CodeInterpreter,
    FileSearch,
    Function,
}

impl ToolCallKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "code_interpreter" => Some(Self::CodeInterpreter),
            "file_search" => Some(Self::FileSearch),
            "function" => Some(Self::Function),
            _ => None,
        }
    }
}

/// Substring of streamed text that refers to a generated file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAnnotation {
    pub text: String,
    pub file_id: String,
}

impl FileAnnotation {
    /// Path the UI fetches the file from
    pub fn serving_path(&self) -> String {
        file_path(&self.file_id)
    }
}

pub fn file_path(file_id: &str) -> String {
    format!("/api/files/{file_id}")
}

/// Function call the backend wants answered before the run can continue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as produced by the model
    pub arguments: String,
}

/// Answer to a [`ToolCallRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// Typed events of one streamed run, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantEvent {
    /// A new assistant message started
    TextCreated,
    TextDelta {
        value: String,
        annotations: Vec<FileAnnotation>,
    },
    /// Complete text of a finished message part
    TextDone { text: String },
    ImageFile { file_id: String },
    ToolCallCreated { id: String, kind: ToolCallKind },
    ToolCallDelta { kind: ToolCallKind, input: String },
    ActionRequired {
        run_id: String,
        tool_calls: Vec<ToolCallRequest>,
    },
    RunCompleted,
    RunFailed { message: String },
    Unknown { name: String },
}

/// Raw file fetched from the backend
#[derive(Debug, Clone)]
pub struct FileContent {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

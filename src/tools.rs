//! Function tools answering the assistant's `requires_action` calls
//!
//! The hosted assistant decides when to call a function; this registry runs
//! it locally and hands the output back for submission.

mod clock;

pub use clock::CurrentTimeTool;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Function definition in the shape the Assistants API expects
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Trait for function tools
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> String;

    /// JSON schema of the arguments
    fn input_schema(&self) -> Value;

    /// Run with parsed arguments. The returned string goes back to the model
    /// verbatim, so errors are reported in-band.
    async fn run(&self, input: Value) -> String;
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in tool
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CurrentTimeTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        let mut definitions: Vec<FunctionDefinition> = self
            .tools
            .values()
            .map(|tool| FunctionDefinition {
                name: tool.name().to_string(),
                description: tool.description(),
                parameters: tool.input_schema(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Run a tool by name. `None` when no such tool is registered.
    pub async fn execute(&self, name: &str, arguments: &str) -> Option<String> {
        let tool = self.tools.get(name)?;
        let input = match serde_json::from_str::<Value>(arguments) {
            Ok(value) => value,
            Err(e) => return Some(format!("Invalid arguments: {e}")),
        };
        Some(tool.run(input).await)
    }
}

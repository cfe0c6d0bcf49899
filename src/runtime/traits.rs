//! Trait abstractions for runtime I/O
//!
//! The assistant backend, recognizer and synthesizer traits live next to
//! their implementations. These two cover the remaining collaborators so the
//! executor can be tested with mocks.

use crate::link::{ConnectionManager, DeviceCommand, LinkError};
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use std::sync::Arc;

/// Answers function tool calls requested by a run
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Output for one call. Always returns something; the run cannot
    /// continue without an answer for every call.
    async fn call(&self, name: &str, arguments: &str) -> String;
}

/// Fire-and-forget commands to the robot's hardware
pub trait DeviceLink: Send + Sync {
    fn signal(&self, command: DeviceCommand) -> Result<(), LinkError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ToolHandler + ?Sized> ToolHandler for Arc<T> {
    async fn call(&self, name: &str, arguments: &str) -> String {
        (**self).call(name, arguments).await
    }
}

impl<T: DeviceLink + ?Sized> DeviceLink for Arc<T> {
    fn signal(&self, command: DeviceCommand) -> Result<(), LinkError> {
        (**self).signal(command)
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

#[async_trait]
impl ToolHandler for ToolRegistry {
    async fn call(&self, name: &str, arguments: &str) -> String {
        if let Some(output) = self.execute(name, arguments).await {
            output
        } else {
            tracing::warn!(tool = %name, "Assistant called an unregistered tool");
            String::new()
        }
    }
}

impl DeviceLink for ConnectionManager {
    fn signal(&self, command: DeviceCommand) -> Result<(), LinkError> {
        if !self.is_connected() {
            tracing::debug!(command = command.as_str(), "Device offline, queueing command");
        }
        self.send(command.as_str())
    }
}

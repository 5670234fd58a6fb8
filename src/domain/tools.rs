//! Greeting tools exposed via Model Context Protocol
//!
//! Provides `greet`, which answers immediately, and `multi-greet`, which
//! reports progress through logging notifications before it answers.

use std::time::Duration;

use async_trait::async_trait;
use rust_mcp_sdk::{
    macros,
    schema::{CallToolResult, ContentBlock, TextContent},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::domain::registry::{
    ArgumentSchema, RegistryError, ToolArguments, ToolDescriptor, ToolHandler, ToolRegistry,
};
use crate::errors::AppError;
use crate::mcp::transport::{NotificationEvent, Notifier};

pub const MULTI_GREET_STEP_DELAY: Duration = Duration::from_millis(1_000);

#[macros::mcp_tool(name = "greet", description = "A simple greeting tool")]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GreetTool {
    /// Name to greet
    pub name: String,
}

#[macros::mcp_tool(
    name = "multi-greet",
    description = "A tool that sends different greetings with delays between them"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct MultiGreetTool {
    /// Name to greet
    pub name: String,
}

/// Builds the process-wide registry with both greeting tools.
pub fn build_registry(step_delay: Duration) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(
        ToolDescriptor::new(GreetTool::tool(), name_schema()),
        Greet,
    )?;
    registry.register(
        ToolDescriptor::new(MultiGreetTool::tool(), name_schema()),
        MultiGreet::new(step_delay),
    )?;
    Ok(registry)
}

pub fn default_registry() -> Result<ToolRegistry, RegistryError> {
    build_registry(MULTI_GREET_STEP_DELAY)
}

fn name_schema() -> ArgumentSchema {
    ArgumentSchema::new().require_text("name")
}

fn parse_arguments<T: serde::de::DeserializeOwned>(arguments: ToolArguments) -> Result<T, AppError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|err| AppError::invalid_params(err.to_string()))
}

fn text_result(text: String) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: None,
    }
}

pub struct Greet;

#[async_trait]
impl ToolHandler for Greet {
    async fn invoke(
        &self,
        arguments: ToolArguments,
        _notifier: &Notifier,
    ) -> Result<CallToolResult, AppError> {
        let GreetTool { name } = parse_arguments(arguments)?;
        info!(name = %name, "greet invoked");

        Ok(text_result(format!("Hello, {name}!")))
    }
}

pub struct MultiGreet {
    step_delay: Duration,
}

impl MultiGreet {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }

    /// Waits one step, then reports whether the client is still listening.
    async fn pause(&self, notifier: &Notifier) -> Result<(), AppError> {
        tokio::time::sleep(self.step_delay).await;
        if notifier.is_closed() {
            return Err(AppError::ClientDisconnected);
        }
        Ok(())
    }
}

#[async_trait]
impl ToolHandler for MultiGreet {
    async fn invoke(
        &self,
        arguments: ToolArguments,
        notifier: &Notifier,
    ) -> Result<CallToolResult, AppError> {
        let MultiGreetTool { name } = parse_arguments(arguments)?;

        notifier.notify(NotificationEvent::debug(format!(
            "Starting multi-greet for {name}"
        )));
        self.pause(notifier).await?;

        notifier.notify(NotificationEvent::info(format!(
            "Sending first greeting to {name}"
        )));
        self.pause(notifier).await?;

        notifier.notify(NotificationEvent::info(format!(
            "Sending second greeting to {name}"
        )));

        Ok(text_result(format!("Good morning, {name}!")))
    }
}

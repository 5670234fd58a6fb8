//! Tool registry
//!
//! Populated once before serving and shared read-only afterwards, so lookups
//! need no locking.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rust_mcp_sdk::schema::{CallToolResult, Tool};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{errors::AppError, mcp::transport::Notifier};

pub type ToolArguments = Map<String, Value>;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(
        &self,
        arguments: ToolArguments,
        notifier: &Notifier,
    ) -> Result<CallToolResult, AppError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
}

/// Declared shape of a tool's named parameters, checked before dispatch.
#[derive(Debug, Clone, Default)]
pub struct ArgumentSchema {
    required_text: Vec<&'static str>,
}

impl ArgumentSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `name` to be present as a non-empty string.
    pub fn require_text(mut self, name: &'static str) -> Self {
        self.required_text.push(name);
        self
    }

    pub fn validate(&self, arguments: &ToolArguments) -> Result<(), AppError> {
        for name in &self.required_text {
            match arguments.get(*name) {
                None => {
                    return Err(AppError::invalid_params(format!(
                        "missing required argument `{name}`"
                    )))
                }
                Some(Value::String(value)) if !value.is_empty() => {}
                Some(_) => {
                    return Err(AppError::invalid_params(format!(
                        "`{name}` must be a non-empty string"
                    )))
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub tool: Tool,
    pub schema: ArgumentSchema,
}

impl ToolDescriptor {
    pub fn new(tool: Tool, schema: ArgumentSchema) -> Self {
        Self { tool, schema }
    }

    pub fn name(&self) -> &str {
        &self.tool.name
    }
}

pub struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    /// Validates `arguments` against the declared schema, then runs the handler.
    pub async fn invoke(
        &self,
        arguments: ToolArguments,
        notifier: &Notifier,
    ) -> Result<CallToolResult, AppError> {
        self.descriptor.schema.validate(&arguments)?;
        self.handler.invoke(arguments, notifier).await
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: impl ToolHandler + 'static,
    ) -> Result<(), RegistryError> {
        let name = descriptor.name().to_string();
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }

        self.index.insert(name, self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&RegisteredTool, AppError> {
        self.index
            .get(name)
            .and_then(|position| self.tools.get(*position))
            .ok_or_else(|| AppError::tool_not_found(name))
    }

    /// Tool listing in registration order.
    pub fn list(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|registered| registered.descriptor.tool.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

//! Tool registry and the greeting tools served over the MCP protocol

pub mod registry;
pub mod tools;

//! HTTP surface for the Model Context Protocol
//!
//! Provides the external API routing, including the `/mcp` invocation endpoint
//! and the metadata endpoints.

pub mod handlers;

//! Model Context Protocol sessions, dispatch and JSON-RPC framing
//!
//! Provides the per-request session lifecycle, the channel transport that
//! carries notifications and results, method routing, and response translation.

pub mod rpc;
pub mod server;
pub mod session;
pub mod transport;

//! Request-scoped transport between a dispatch task and its HTTP response
//!
//! Every frame an invocation produces (progress notifications followed by
//! exactly one response frame) travels through one unbounded channel, so the
//! order in which a handler emits them is the order the client sees them.
//! Closing the receiving side turns every further send into a silent no-op.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::mcp::rpc::{ResponseFrame, JSON_RPC_VERSION};

pub const LOGGING_MESSAGE_METHOD: &str = "notifications/message";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    pub level: LoggingLevel,
    pub data: Value,
}

impl NotificationEvent {
    pub fn new(level: LoggingLevel, data: impl Into<Value>) -> Self {
        Self {
            level,
            data: data.into(),
        }
    }

    pub fn debug(data: impl Into<Value>) -> Self {
        Self::new(LoggingLevel::Debug, data)
    }

    pub fn info(data: impl Into<Value>) -> Self {
        Self::new(LoggingLevel::Info, data)
    }

    pub fn to_json_rpc(&self) -> Value {
        json!({
            "jsonrpc": JSON_RPC_VERSION,
            "method": LOGGING_MESSAGE_METHOD,
            "params": self,
        })
    }
}

#[derive(Debug)]
pub enum SessionFrame {
    Notification(NotificationEvent),
    Response(ResponseFrame),
}

/// Binds a fresh transport pair. Nothing about it is shared with any other
/// request.
pub fn bind() -> (Transport, TransportReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Transport { sender }, TransportReceiver { receiver })
}

/// Sending half, owned by the dispatch side of a session.
#[derive(Debug)]
pub struct Transport {
    sender: UnboundedSender<SessionFrame>,
}

impl Transport {
    pub fn notifier(&self) -> Notifier {
        Notifier {
            sender: self.sender.clone(),
        }
    }

    /// Delivers the terminal frame. Returns `false` when the response side is
    /// already gone.
    pub fn respond(self, frame: ResponseFrame) -> bool {
        self.sender.send(SessionFrame::Response(frame)).is_ok()
    }
}

/// Handle given to tool handlers for emitting progress notifications.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: UnboundedSender<SessionFrame>,
}

impl Notifier {
    /// Queues `event` behind every previously sent frame. Sending on a closed
    /// transport drops the event and returns `false`; it never fails.
    pub fn notify(&self, event: NotificationEvent) -> bool {
        self.sender.send(SessionFrame::Notification(event)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving half, owned by the response side of a session.
#[derive(Debug)]
pub struct TransportReceiver {
    receiver: UnboundedReceiver<SessionFrame>,
}

impl TransportReceiver {
    pub async fn recv(&mut self) -> Option<SessionFrame> {
        self.receiver.recv().await
    }

    pub fn close(&mut self) {
        self.receiver.close();
    }
}

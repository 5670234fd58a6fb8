//! Request-scoped protocol sessions
//!
//! Every inbound call gets its own session: a fresh transport pair, a view of
//! the shared registry, and a lifecycle that always ends in `Closed`. The
//! dispatch half ([`ToolServer`]) runs in its own task; the response half
//! ([`Session`]) stays with the HTTP handler, and dropping it is the
//! response-closed hook.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use tokio::{sync::watch, task::AbortHandle};
use tracing::{debug, error};

use crate::domain::registry::ToolRegistry;
use crate::errors::AppError;
use crate::mcp::rpc::ResponseFrame;
use crate::mcp::server::{handle_request, InvocationRequest};
use crate::mcp::transport::{self, SessionFrame, Transport, TransportReceiver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Dispatching,
    Completed,
    Faulted,
    Cancelled,
    Closed,
}

impl SessionState {
    pub fn can_advance_to(self, next: Self) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Created, Dispatching)
                | (Dispatching, Completed)
                | (Created | Dispatching, Faulted | Cancelled)
                | (Created | Dispatching | Completed | Faulted | Cancelled, Closed)
        )
    }
}

#[derive(Debug, Clone)]
struct Lifecycle(Arc<watch::Sender<SessionState>>);

impl Lifecycle {
    fn new() -> Self {
        let (sender, _) = watch::channel(SessionState::Created);
        Self(Arc::new(sender))
    }

    /// Moves to `next` if that is a legal transition; returns whether it did.
    fn advance(&self, next: SessionState) -> bool {
        self.0.send_if_modified(|state| {
            if state.can_advance_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn current(&self) -> SessionState {
        *self.0.borrow()
    }
}

/// Process-wide session accounting. Only ids and a live count are kept.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    last_id: Arc<AtomicU64>,
    open: Arc<AtomicUsize>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn open(&self) -> u64 {
        self.open.fetch_add(1, Ordering::SeqCst);
        self.last_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn close(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Creates a fresh session pair for one request. Nothing in either half is
/// reused by any other request.
pub fn open_session(registry: &Arc<ToolRegistry>, tracker: &SessionTracker) -> (ToolServer, Session) {
    let id = tracker.open();
    let (transport, receiver) = transport::bind();
    let lifecycle = Lifecycle::new();

    debug!(session = id, "session opened");

    (
        ToolServer {
            id,
            registry: Arc::clone(registry),
            transport,
            lifecycle: lifecycle.clone(),
        },
        Session {
            id,
            receiver,
            lifecycle,
            task: None,
            tracker: tracker.clone(),
        },
    )
}

/// Dispatch half of a session: the registry view plus the sending transport.
pub struct ToolServer {
    id: u64,
    registry: Arc<ToolRegistry>,
    transport: Transport,
    lifecycle: Lifecycle,
}

impl ToolServer {
    pub async fn serve(self, request: InvocationRequest) {
        self.lifecycle.advance(SessionState::Dispatching);

        let notifier = self.transport.notifier();
        let outcome =
            handle_request(&self.registry, &request.method, request.params, &notifier).await;

        // The state must be final before the frame is visible to the
        // response side, which may close the session as soon as it sees it.
        match &outcome {
            Ok(_) => {
                self.lifecycle.advance(SessionState::Completed);
            }
            Err(AppError::ClientDisconnected) => {
                self.lifecycle.advance(SessionState::Cancelled);
                debug!(session = self.id, "invocation cancelled by client disconnect");
                return;
            }
            Err(_) => {
                self.lifecycle.advance(SessionState::Faulted);
            }
        }

        if !self
            .transport
            .respond(ResponseFrame::new(request.correlation, outcome))
        {
            debug!(session = self.id, "response dropped, transport already closed");
        }
    }
}

/// Response half of a session, owned by the HTTP handler or its stream.
pub struct Session {
    id: u64,
    receiver: TransportReceiver,
    lifecycle: Lifecycle,
    task: Option<AbortHandle>,
    tracker: SessionTracker,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.lifecycle.0.subscribe()
    }

    /// Runs `request` on `server` in its own task.
    pub fn dispatch(&mut self, server: ToolServer, request: InvocationRequest) {
        let handle = tokio::spawn(server.serve(request));
        self.task = Some(handle.abort_handle());
    }

    /// Next frame produced by the invocation, in emission order. `None` means
    /// the dispatch side is gone; if that happened before a response was
    /// produced the session is marked faulted.
    pub async fn next_frame(&mut self) -> Option<SessionFrame> {
        let frame = self.receiver.recv().await;
        if frame.is_none() && self.lifecycle.advance(SessionState::Faulted) {
            error!(session = self.id, "invocation ended without producing a response");
        }
        frame
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }

        if self.lifecycle.advance(SessionState::Cancelled) {
            debug!(session = self.id, "response closed before invocation finished");
        }
        self.lifecycle.advance(SessionState::Closed);
        self.tracker.close();

        debug!(session = self.id, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use rust_mcp_sdk::{macros, schema::CallToolResult};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::{open_session, SessionState, SessionTracker};
    use crate::{
        domain::{
            registry::{ArgumentSchema, ToolArguments, ToolDescriptor, ToolHandler, ToolRegistry},
            tools::build_registry,
        },
        errors::AppError,
        mcp::{
            rpc::Correlation,
            server::InvocationRequest,
            transport::{Notifier, SessionFrame},
        },
    };

    fn tool_call(tool: &str, name: &str) -> InvocationRequest {
        InvocationRequest {
            correlation: Correlation::JsonRpc(json!(1)),
            method: "tools/call".to_string(),
            params: Some(json!({"name": tool, "arguments": {"name": name}})),
        }
    }

    #[test]
    fn closed_is_reachable_from_every_live_state() {
        for state in [
            SessionState::Created,
            SessionState::Dispatching,
            SessionState::Completed,
            SessionState::Faulted,
            SessionState::Cancelled,
        ] {
            assert!(state.can_advance_to(SessionState::Closed));
        }
        assert!(!SessionState::Closed.can_advance_to(SessionState::Closed));
        assert!(!SessionState::Completed.can_advance_to(SessionState::Cancelled));
        assert!(!SessionState::Created.can_advance_to(SessionState::Completed));
    }

    #[tokio::test]
    async fn completed_session_closes_exactly_once() {
        let registry = Arc::new(build_registry(Duration::from_millis(1)).expect("registry"));
        let tracker = SessionTracker::new();
        let (server, mut session) = open_session(&registry, &tracker);
        let mut states = session.subscribe();

        session.dispatch(server, tool_call("greet", "World"));
        let frame = session.next_frame().await;

        match frame {
            Some(SessionFrame::Response(response)) => {
                let body = response.into_body().expect("greet result");
                assert_eq!(body["result"]["content"][0]["text"], "Hello, World!");
            }
            other => panic!("expected response frame, got {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(tracker.open_sessions(), 1);

        drop(session);

        assert_eq!(*states.borrow_and_update(), SessionState::Closed);
        assert_eq!(tracker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn sessions_get_distinct_ids() {
        let registry = Arc::new(ToolRegistry::new());
        let tracker = SessionTracker::new();

        let (_, first) = open_session(&registry, &tracker);
        let (_, second) = open_session(&registry, &tracker);

        assert_ne!(first.id(), second.id());
        assert_eq!(tracker.open_sessions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_mid_stream_cancels_and_releases() {
        let registry = Arc::new(build_registry(Duration::from_secs(30)).expect("registry"));
        let tracker = SessionTracker::new();
        let (server, mut session) = open_session(&registry, &tracker);
        let states = session.subscribe();

        session.dispatch(server, tool_call("multi-greet", "X"));
        let first = session.next_frame().await;
        assert!(matches!(first, Some(SessionFrame::Notification(_))));
        assert_eq!(session.state(), SessionState::Dispatching);

        drop(session);

        assert_eq!(*states.borrow(), SessionState::Closed);
        assert_eq!(tracker.open_sessions(), 0);

        // Run past both step delays; the aborted task must stay silent.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(*states.borrow(), SessionState::Closed);
    }

    #[tokio::test]
    async fn fault_is_delivered_as_response_frame() {
        let registry = Arc::new(build_registry(Duration::from_millis(1)).expect("registry"));
        let tracker = SessionTracker::new();
        let (server, mut session) = open_session(&registry, &tracker);

        session.dispatch(server, tool_call("unknown", "X"));

        match session.next_frame().await {
            Some(SessionFrame::Response(response)) => {
                assert!(matches!(
                    response.outcome,
                    Err(AppError::ToolNotFound { .. })
                ));
            }
            other => panic!("expected fault frame, got {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Faulted);
    }

    #[macros::mcp_tool(name = "explode", description = "Always panics")]
    #[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
    struct ExplodeTool {
        name: String,
    }

    struct Explode;

    #[async_trait]
    impl ToolHandler for Explode {
        async fn invoke(
            &self,
            _arguments: ToolArguments,
            _notifier: &Notifier,
        ) -> Result<CallToolResult, AppError> {
            panic!("handler blew up");
        }
    }

    #[tokio::test]
    async fn panicking_handler_faults_the_session() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolDescriptor::new(ExplodeTool::tool(), ArgumentSchema::new()),
                Explode,
            )
            .expect("registration");
        let registry = Arc::new(registry);
        let tracker = SessionTracker::new();
        let (server, mut session) = open_session(&registry, &tracker);

        session.dispatch(server, tool_call("explode", "X"));

        assert!(session.next_frame().await.is_none());
        assert_eq!(session.state(), SessionState::Faulted);

        drop(session);
        assert_eq!(tracker.open_sessions(), 0);
    }
}

//! Axum HTTP handlers for the web server
//!
//! Provides the `/mcp` invocation endpoint, the static method policy for it,
//! and general metadata endpoints.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::AppError;
use crate::mcp::server::{parse_envelope, Envelope};
use crate::mcp::session::{open_session, Session};
use crate::mcp::transport::SessionFrame;
use crate::AppState;

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
    })
}

/// GET and DELETE on `/mcp`: there is no session to stream from or end.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// One JSON body holding the final frame; progress notifications are dropped.
    Json,
    /// Server-sent events: each notification, then the final frame.
    EventStream,
}

impl ResponseMode {
    pub fn negotiate(headers: &HeaderMap) -> Self {
        let wants_stream = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .filter_map(|part| part.split(';').next())
            .any(|media| media.trim().eq_ignore_ascii_case(EVENT_STREAM));

        if wants_stream {
            Self::EventStream
        } else {
            Self::Json
        }
    }
}

pub async fn mcp_endpoint(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request = match parse_envelope(&body) {
        Ok(Envelope::Invocation(request)) => request,
        Ok(Envelope::Notification { method }) => {
            debug!(method = %method, "notification acknowledged");
            return StatusCode::ACCEPTED.into_response();
        }
        Err(err) => return err.into_response(),
    };

    let (server, mut session) = open_session(&state.registry, &state.sessions);
    session.dispatch(server, request);

    match ResponseMode::negotiate(&headers) {
        ResponseMode::Json => respond_json(session).await,
        ResponseMode::EventStream => respond_stream(session).await,
    }
}

async fn respond_json(mut session: Session) -> Response {
    while let Some(frame) = session.next_frame().await {
        match frame {
            SessionFrame::Notification(event) => {
                debug!(
                    session = session.id(),
                    level = ?event.level,
                    "notification dropped, client did not accept an event stream"
                );
            }
            SessionFrame::Response(frame) => return frame.into_response(),
        }
    }

    AppError::internal("invocation ended without producing a response").into_response()
}

/// Nothing is committed to the client until the first frame exists, so a
/// fault raised before any progress still becomes a plain HTTP 500.
async fn respond_stream(mut session: Session) -> Response {
    let first = match session.next_frame().await {
        Some(SessionFrame::Response(frame)) if frame.is_fault() => return frame.into_response(),
        Some(frame) => frame,
        None => {
            return AppError::internal("invocation ended without producing a response")
                .into_response()
        }
    };

    let events = stream::unfold(Some((session, Some(first))), next_event);
    Sse::new(events).into_response()
}

type StreamState = Option<(Session, Option<SessionFrame>)>;

async fn next_event(state: StreamState) -> Option<(Result<Event, Infallible>, StreamState)> {
    let (mut session, pending) = state?;
    let frame = match pending {
        Some(frame) => frame,
        None => session.next_frame().await?,
    };

    match frame {
        SessionFrame::Notification(event) => {
            Some((Ok(message_event(&event.to_json_rpc())), Some((session, None))))
        }
        SessionFrame::Response(frame) => match frame.into_body() {
            Ok(body) => Some((Ok(message_event(&body)), None)),
            Err(err) => {
                error!(
                    session = session.id(),
                    error = %err,
                    "invocation failed after streaming began, fault not delivered"
                );
                None
            }
        },
    }
}

fn message_event(payload: &Value) -> Event {
    Event::default().event("message").data(payload.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderMap, HeaderValue};

    use super::ResponseMode;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn event_stream_accept_selects_streaming() {
        assert_eq!(
            ResponseMode::negotiate(&accept("application/json, text/event-stream")),
            ResponseMode::EventStream
        );
        assert_eq!(
            ResponseMode::negotiate(&accept("Text/Event-Stream;q=0.9")),
            ResponseMode::EventStream
        );
    }

    #[test]
    fn other_accept_values_select_json() {
        assert_eq!(ResponseMode::negotiate(&HeaderMap::new()), ResponseMode::Json);
        assert_eq!(ResponseMode::negotiate(&accept("*/*")), ResponseMode::Json);
        assert_eq!(
            ResponseMode::negotiate(&accept("application/json")),
            ResponseMode::Json
        );
    }
}

//! Per-request service: route, dispatch, await completion
//!
//! Every request becomes a [`DispatchRequest`] plus a fresh
//! [`CompletionContext`]. The connection then waits on the context's
//! receiver until the handler completes it, the dispatch deadline passes, or
//! the server shuts down. A request future dropped by hyper (peer gone)
//! cancels its context on the way out.

use crate::completion::{next_request_id, CancelOnDrop, CompletionContext, ResponseReceiver};
use crate::dispatch::{DispatchRequest, Dispatcher};
use crate::frame::ResponseFrame;
use crate::router::Router;
use bytes::Bytes;
use ferry_router::Method;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) type HttpResponse = hyper::Response<Full<Bytes>>;

/// Reasons to drop a connection without writing a response
#[derive(Debug, Error)]
pub enum ConnectionAbort {
    #[error("server shutting down")]
    Shutdown,

    #[error("failed to read request body: {0}")]
    Body(BoxError),
}

/// State shared by every connection of one server
pub(crate) struct ServiceState {
    pub router: Arc<Router>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub shutdown: watch::Receiver<bool>,
    pub request_timeout: Duration,
    pub dispatch_timeout: Option<Duration>,
    pub max_body_size: usize,
}

/// Resolves once the server starts shutting down
///
/// Returns unit so the watch read guard is released before the caller
/// awaits anything else.
pub(crate) async fn shutdown_signal(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}

enum Outcome {
    Settled(Result<Bytes, tokio::sync::oneshot::error::RecvError>),
    TimedOut,
    Shutdown,
}

/// Handle one request
pub(crate) async fn handle_request(
    state: Arc<ServiceState>,
    req: hyper::Request<Incoming>,
) -> Result<HttpResponse, ConnectionAbort> {
    // No method fallback: extension methods and unregistered ones are both 404
    let Some(method) = Method::parse(req.method().as_str().as_bytes()) else {
        return Ok(plain(StatusCode::NOT_FOUND, "Not Found"));
    };
    let path = req.uri().path().to_string();
    let Some(matched) = state.router.find(method, &path) else {
        return Ok(plain(StatusCode::NOT_FOUND, "Not Found"));
    };

    let declared_len = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > state.max_body_size) {
        return Ok(plain(StatusCode::PAYLOAD_TOO_LARGE, "Request Entity Too Large"));
    }

    let query = req.uri().query().map(str::to_owned);
    let mut headers = SmallVec::with_capacity(req.headers().len());
    for (name, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            headers.push((name.as_str().to_string(), v.to_string()));
        }
    }

    let body = Limited::new(req.into_body(), state.max_body_size);
    let body = match tokio::time::timeout(state.request_timeout, body.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(e)) if e.is::<LengthLimitError>() => {
            return Ok(plain(StatusCode::PAYLOAD_TOO_LARGE, "Request Entity Too Large"));
        }
        Ok(Err(e)) => return Err(ConnectionAbort::Body(e)),
        Err(_) => return Ok(plain(StatusCode::REQUEST_TIMEOUT, "Request Timeout")),
    };

    let request = DispatchRequest {
        request_id: next_request_id(),
        handler_id: matched.handler_id,
        method,
        path,
        query,
        headers,
        params: matched.params,
        body,
    };
    let request_id = request.request_id;
    let handler_id = request.handler_id;

    let (ctx, receiver) = CompletionContext::new(request_id);
    let guard = CancelOnDrop::new(ctx.clone());

    if let Err(e) = state.dispatcher.dispatch(request, ctx.clone()) {
        guard.disarm();
        ctx.cancel();
        tracing::warn!(request_id, handler_id, error = %e, "dispatch failed");
        return Ok(plain(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable"));
    }

    let outcome = await_completion(&state, receiver).await;
    let response = settle(&ctx, outcome);
    guard.disarm();
    response
}

async fn await_completion(state: &ServiceState, mut receiver: ResponseReceiver) -> (Outcome, ResponseReceiver) {
    let mut shutdown = state.shutdown.clone();
    let deadline = async {
        match state.dispatch_timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    let outcome = tokio::select! {
        biased;
        settled = &mut receiver => Outcome::Settled(settled),
        _ = deadline => Outcome::TimedOut,
        _ = shutdown_signal(&mut shutdown) => Outcome::Shutdown,
    };
    (outcome, receiver)
}

fn settle(
    ctx: &CompletionContext,
    (outcome, mut receiver): (Outcome, ResponseReceiver),
) -> Result<HttpResponse, ConnectionAbort> {
    let request_id = ctx.request_id();
    let settled = match outcome {
        Outcome::Settled(settled) => settled.ok(),
        // Losing the cancel race means the handler got there first
        Outcome::TimedOut if ctx.cancel() => {
            tracing::warn!(request_id, "dispatch timed out");
            return Ok(plain(StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout"));
        }
        Outcome::Shutdown if ctx.cancel() => {
            tracing::debug!(request_id, "request cancelled by shutdown");
            return Err(ConnectionAbort::Shutdown);
        }
        Outcome::TimedOut | Outcome::Shutdown => receiver.try_recv().ok(),
    };

    match settled {
        Some(frame) => Ok(frame_response(request_id, &frame)),
        None => {
            tracing::warn!(request_id, "handler released request without completing");
            Ok(plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"))
        }
    }
}

/// Turn a completed response frame into an HTTP response
fn frame_response(request_id: u64, frame: &[u8]) -> HttpResponse {
    let frame = match ResponseFrame::decode(frame) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(request_id, error = %e, "malformed response frame");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };
    // decode already rejected anything outside 100..=999
    let status = StatusCode::from_u16(frame.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = hyper::Response::new(Full::new(frame.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in frame.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::warn!(request_id, header = %name, "dropping invalid response header"),
        }
    }
    response
}

fn plain(status: StatusCode, message: &'static str) -> HttpResponse {
    let mut response = hyper::Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_response() {
        let res = plain(StatusCode::NOT_FOUND, "Not Found");
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_frame_response_copies_status_headers_body() {
        let frame = ResponseFrame::new(201)
            .header("content-type", "application/json")
            .header("x-trace", "a")
            .header("x-trace", "b")
            .body("{}")
            .encode()
            .unwrap();
        let res = frame_response(1, &frame);
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(res.headers().get_all("x-trace").iter().count(), 2);
    }

    #[test]
    fn test_frame_response_drops_invalid_headers() {
        let frame = ResponseFrame::new(200)
            .header("bad header", "x")
            .header("x-ok", "line\nbreak")
            .header("x-kept", "yes")
            .encode()
            .unwrap();
        let res = frame_response(1, &frame);
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().len(), 1);
        assert_eq!(res.headers()["x-kept"], "yes");
    }

    #[test]
    fn test_malformed_frame_is_internal_error() {
        let res = frame_response(1, b"\x01");
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_timeout_loses_to_completion() {
        let (ctx, receiver) = CompletionContext::new(5);
        let frame = ResponseFrame::new(200).body("late").encode().unwrap();
        ctx.complete(frame);

        let res = settle(&ctx, (Outcome::TimedOut, receiver)).unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_timeout_cancels_pending_context() {
        let (ctx, receiver) = CompletionContext::new(5);
        let res = settle(&ctx, (Outcome::TimedOut, receiver)).unwrap();
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_shutdown_aborts_pending_context() {
        let (ctx, receiver) = CompletionContext::new(5);
        let err = settle(&ctx, (Outcome::Shutdown, receiver)).unwrap_err();
        assert!(matches!(err, ConnectionAbort::Shutdown));
        assert!(ctx.is_cancelled());
    }
}

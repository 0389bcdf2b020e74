//! Dispatcher seam between the server and whatever runs the handlers

use crate::completion::CompletionContext;
use crate::Result;
use bytes::Bytes;
use ferry_router::{HandlerId, Method};
use smallvec::SmallVec;
use std::sync::Arc;

/// Request as handed to a dispatcher
///
/// Header names are lowercase (hyper normalises them). Params come from the
/// router in pattern order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub request_id: u64,
    pub handler_id: HandlerId,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: SmallVec<[(String, String); 16]>,
    pub params: Vec<(String, String)>,
    pub body: Bytes,
}

impl DispatchRequest {
    /// Get header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get path parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Invokes the handler for a matched request
///
/// `dispatch` must not block waiting for the handler: it hands the request
/// and its context off and returns. The handler completes the context now or
/// later, from any thread. An `Err` means the request was never handed off;
/// the server answers `503` and cancels the context.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, request: DispatchRequest, ctx: Arc<CompletionContext>) -> Result<()>;
}

impl<F> Dispatcher for F
where
    F: Fn(DispatchRequest, Arc<CompletionContext>) + Send + Sync + 'static,
{
    fn dispatch(&self, request: DispatchRequest, ctx: Arc<CompletionContext>) -> Result<()> {
        self(request, ctx);
        Ok(())
    }
}

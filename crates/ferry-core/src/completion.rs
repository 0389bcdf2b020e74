//! Completion contexts: one-shot response hand-off from the handler side
//!
//! ```text
//! Pending ──complete──▶ Completed ──release──▶ Released
//!    │ └────cancel────▶ Cancelled ──release──▶ Released
//!    └───────release (abandon)───────────────▶ Released
//! ```
//!
//! The outcome lives in one atomic byte. `complete`, `cancel` and an
//! abandoning `release` each make a single compare-and-swap away from
//! `Pending`; exactly one of them wins and the losers are silent no-ops.
//! Only the winner touches the response sink.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

const STATE_PENDING: u8 = 0;
const STATE_COMPLETED: u8 = 1;
const STATE_CANCELLED: u8 = 2;
const STATE_RELEASED: u8 = 3;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique request id
pub(crate) fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Observable lifecycle state of a [`CompletionContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Pending,
    Completed,
    Cancelled,
    Released,
}

/// Receiving half held by the connection awaiting the response
pub type ResponseReceiver = oneshot::Receiver<Bytes>;

/// Per-request completion state shared between the connection and the handler side
#[derive(Debug)]
pub struct CompletionContext {
    request_id: u64,
    /// Winner of the Pending transition
    outcome: AtomicU8,
    /// Memory-lifecycle flag, set once the handler side is done with us
    released: AtomicBool,
    sink: Mutex<Option<oneshot::Sender<Bytes>>>,
}

impl CompletionContext {
    /// Create a pending context and the receiver its completion is delivered to
    pub fn new(request_id: u64) -> (Arc<Self>, ResponseReceiver) {
        let (sink, receiver) = oneshot::channel();
        let context = Arc::new(Self {
            request_id,
            outcome: AtomicU8::new(STATE_PENDING),
            released: AtomicBool::new(false),
            sink: Mutex::new(Some(sink)),
        });
        (context, receiver)
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn state(&self) -> CompletionState {
        if self.released.load(Ordering::Acquire) {
            return CompletionState::Released;
        }
        match self.outcome.load(Ordering::Acquire) {
            STATE_PENDING => CompletionState::Pending,
            STATE_COMPLETED => CompletionState::Completed,
            STATE_CANCELLED => CompletionState::Cancelled,
            _ => CompletionState::Released,
        }
    }

    /// Lock-free; safe to poll from hot loops on any thread
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.outcome.load(Ordering::Acquire) == STATE_CANCELLED
    }

    /// Deliver the response. Returns `false` if the context was already terminal.
    pub fn complete(&self, response: Bytes) -> bool {
        self.complete_with(|| response)
    }

    /// Like [`complete`](Self::complete), building the response only if this call wins
    pub fn complete_with(&self, response: impl FnOnce() -> Bytes) -> bool {
        if !self.transition(STATE_COMPLETED) {
            return false;
        }
        if let Some(sink) = self.sink.lock().take() {
            // The connection may already be gone; nothing left to tell it
            let _ = sink.send(response());
        }
        true
    }

    /// Mark the request as abandoned by the connection. Returns `false` if
    /// the context was already terminal.
    pub fn cancel(&self) -> bool {
        if !self.transition(STATE_CANCELLED) {
            return false;
        }
        self.sink.lock().take();
        true
    }

    /// Handler side is done with the context
    ///
    /// Releasing a still pending context abandons it: the sink is closed and
    /// the connection stops waiting. Returns the state observed before release.
    pub fn release(&self) -> CompletionState {
        let before = self.state();
        if self.transition(STATE_RELEASED) {
            self.sink.lock().take();
        }
        self.released.store(true, Ordering::Release);
        before
    }

    fn transition(&self, to: u8) -> bool {
        self.outcome
            .compare_exchange(STATE_PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Cancels the context when dropped unless disarmed
///
/// Held by the connection while it waits; if hyper drops the request future
/// because the peer went away, the handler side observes the cancellation.
#[derive(Debug)]
pub struct CancelOnDrop {
    context: Option<Arc<CompletionContext>>,
}

impl CancelOnDrop {
    pub fn new(context: Arc<CompletionContext>) -> Self {
        Self {
            context: Some(context),
        }
    }

    pub fn disarm(mut self) {
        self.context = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            if context.cancel() {
                tracing::debug!(request_id = context.request_id(), "request cancelled");
            }
        }
    }
}

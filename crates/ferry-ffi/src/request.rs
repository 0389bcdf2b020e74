//! Completion context exports

use crate::state::{contexts, guarded};
use bytes::Bytes;
use ferry_core::{CompletionState, Error};
use std::slice;

/// Complete a request with an encoded response frame
///
/// Ignored if the request was already completed or cancelled. An unknown
/// handle or a null frame pointer is recorded in the error slot.
///
/// # Safety
///
/// `response` must point to `len` readable bytes, or be null with `len` 0.
#[no_mangle]
pub unsafe extern "C" fn ferry_request_complete(ctx: u64, response: *const u8, len: usize) {
    guarded((), || {
        let context = contexts().get(ctx)?;
        let frame = if len == 0 {
            &[][..]
        } else if response.is_null() {
            return Err(Error::InvalidArgument("response pointer is null".into()));
        } else {
            // SAFETY: caller guarantees `len` readable bytes at `response`
            unsafe { slice::from_raw_parts(response, len) }
        };

        if !context.complete_with(|| Bytes::copy_from_slice(frame)) {
            tracing::debug!(request_id = context.request_id(), "completion ignored, context already settled");
        }
        Ok(())
    })
}

/// Give up the host's reference to a completion context
///
/// Releasing a request that was never completed abandons it and the client
/// receives `500`. Releasing twice is ignored.
#[no_mangle]
pub extern "C" fn ferry_request_release(ctx: u64) {
    let Ok(context) = contexts().remove(ctx) else {
        return;
    };
    if context.release() == CompletionState::Pending {
        tracing::warn!(request_id = context.request_id(), "request released without completion");
    }
}

/// Whether the client side gave up on this request
///
/// Lock-free on the context itself. Unknown or released handles report
/// `true`: nobody is waiting for them.
#[no_mangle]
pub extern "C" fn ferry_request_is_cancelled(ctx: u64) -> bool {
    contexts()
        .get(ctx)
        .map_or(true, |context| context.is_cancelled())
}

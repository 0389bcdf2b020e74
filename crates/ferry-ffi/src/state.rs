//! Process-wide boundary state: handle arenas and the last-error slot

use ferry_core::{CompletionContext, Error, ErrorSlot, HandleArena, Result, Router, Server};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

pub(crate) fn servers() -> &'static HandleArena<Server> {
    static SERVERS: OnceLock<HandleArena<Server>> = OnceLock::new();
    SERVERS.get_or_init(HandleArena::new)
}

pub(crate) fn routers() -> &'static HandleArena<Router> {
    static ROUTERS: OnceLock<HandleArena<Router>> = OnceLock::new();
    ROUTERS.get_or_init(HandleArena::new)
}

pub(crate) fn contexts() -> &'static HandleArena<CompletionContext> {
    static CONTEXTS: OnceLock<HandleArena<CompletionContext>> = OnceLock::new();
    CONTEXTS.get_or_init(HandleArena::new)
}

pub(crate) fn last_error() -> &'static ErrorSlot {
    static LAST_ERROR: OnceLock<ErrorSlot> = OnceLock::new();
    LAST_ERROR.get_or_init(ErrorSlot::new)
}

/// Run a boundary call, recording any failure and returning its status code
///
/// The error slot is only written on failure. In unwinding builds a panic
/// is reported as an internal error instead of unwinding into the caller.
/// The release profile sets `panic = "abort"`, so there a panic aborts the
/// process before this frame sees it.
fn run<T>(call: impl FnOnce() -> Result<T>) -> std::result::Result<T, i32> {
    let error = match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => e,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(%message, "panic at boundary");
            Error::Internal(message)
        }
    };
    tracing::debug!(code = error.code(), %error, "boundary call failed");
    last_error().record(error.to_string());
    Err(error.code())
}

/// Value-returning boundary call; `on_error` is the failure sentinel
pub(crate) fn guarded<T>(on_error: T, call: impl FnOnce() -> Result<T>) -> T {
    run(call).unwrap_or(on_error)
}

/// Status-returning boundary call: 0 on success, the error code otherwise
pub(crate) fn status(call: impl FnOnce() -> Result<()>) -> i32 {
    match run(call) {
        Ok(()) => 0,
        Err(code) => code,
    }
}

//! Router exports
//!
//! A router handle can be shared by several servers; freeing the handle
//! does not stop servers that still use the router.

use crate::state::{routers, status};
use ferry_core::{Error, Result, Router};
use std::sync::Arc;
use std::{slice, str};

/// Borrow a UTF-8 pattern passed as pointer and length
///
/// # Safety
///
/// `ptr` must be null or point to `len` readable bytes that outlive `'a`.
pub(crate) unsafe fn pattern_arg<'a>(ptr: *const u8, len: usize) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::InvalidArgument("pattern pointer is null".into()));
    }
    // SAFETY: non-null, caller guarantees `len` readable bytes
    let bytes = unsafe { slice::from_raw_parts(ptr, len) };
    str::from_utf8(bytes).map_err(|_| Error::InvalidArgument("pattern is not valid UTF-8".into()))
}

/// Create an empty router
#[no_mangle]
pub extern "C" fn ferry_router_create() -> u64 {
    routers().insert(Arc::new(Router::new())).raw()
}

/// Free a router handle; unknown handles are ignored
#[no_mangle]
pub extern "C" fn ferry_router_free(router: u64) {
    let _ = routers().remove(router);
}

/// Register a route on a router
///
/// Returns 0 on success or a negative status code, with the message in the
/// error slot.
///
/// # Safety
///
/// `pattern` must point to `len` readable bytes for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn ferry_router_register_route(
    router: u64,
    method: u8,
    pattern: *const u8,
    len: usize,
    handler_id: u64,
) -> i32 {
    status(|| {
        let router = routers().get(router)?;
        // SAFETY: forwarded caller contract
        let pattern = unsafe { pattern_arg(pattern, len) }?;
        router.register_code(method, pattern, handler_id)
    })
}

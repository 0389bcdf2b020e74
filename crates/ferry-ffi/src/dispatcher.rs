//! Foreign dispatcher: hands matched requests to a registered C callback

use crate::state::contexts;
use arc_swap::ArcSwapOption;
use ferry_core::frame::encode_request;
use ferry_core::{CompletionContext, DispatchRequest, Dispatcher, Error, Result};
use std::ffi::c_void;
use std::sync::Arc;

/// Handler invocation callback
///
/// Arguments: user data, handler id, request frame pointer and length,
/// completion context handle. The frame is only valid during the call.
pub type DispatchCallback = extern "C" fn(
    user_data: *mut c_void,
    handler_id: u64,
    request: *const u8,
    request_len: usize,
    ctx: u64,
);

struct Installed {
    callback: DispatchCallback,
    user_data: UserData,
}

/// Opaque pointer owned by the host
struct UserData(*mut c_void);

// The host promises the pointer may be used from any worker thread
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

static INSTALLED: ArcSwapOption<Installed> = ArcSwapOption::const_empty();

/// Install the handler callback, replacing any previous one
///
/// Passing a null callback uninstalls it; requests then get `503`.
/// Servers pick up the change with their next request.
#[no_mangle]
pub extern "C" fn ferry_set_dispatcher(callback: Option<DispatchCallback>, user_data: *mut c_void) {
    let installed = callback.map(|callback| {
        Arc::new(Installed {
            callback,
            user_data: UserData(user_data),
        })
    });
    tracing::debug!(installed = installed.is_some(), "dispatcher set");
    INSTALLED.store(installed);
}

/// [`Dispatcher`] backed by the installed callback
#[derive(Debug, Default, Clone, Copy)]
pub struct ForeignDispatcher;

impl Dispatcher for ForeignDispatcher {
    fn dispatch(&self, request: DispatchRequest, ctx: Arc<CompletionContext>) -> Result<()> {
        let installed = INSTALLED.load_full().ok_or_else(|| {
            Error::Unavailable("no dispatcher installed; call ferry_set_dispatcher".into())
        })?;
        let frame = encode_request(&request).map_err(|e| Error::Internal(e.to_string()))?;

        // Released by the host through ferry_request_release
        let handle = contexts().insert(ctx);
        (installed.callback)(
            installed.user_data.0,
            request.handler_id,
            frame.as_ptr(),
            frame.len(),
            handle.raw(),
        );
        Ok(())
    }
}

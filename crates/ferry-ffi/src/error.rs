//! Last-error exports
//!
//! Every fallible export records its failure here. The message persists
//! until the next failure overwrites it; reading does not clear it.

use crate::state::last_error;
use std::ffi::{c_char, CString};
use std::ptr;

/// Copy of the most recent error message, or null if no call ever failed
///
/// The caller owns the returned string and must pass it to
/// [`ferry_error_free`].
#[no_mangle]
pub extern "C" fn ferry_last_error_message() -> *mut c_char {
    match last_error().last() {
        Some(message) => message.into_raw(),
        None => ptr::null_mut(),
    }
}

/// Free a string returned by [`ferry_last_error_message`]
///
/// # Safety
///
/// `message` must be null or a pointer obtained from
/// `ferry_last_error_message` that has not been freed yet.
#[no_mangle]
pub unsafe extern "C" fn ferry_error_free(message: *mut c_char) {
    if message.is_null() {
        return;
    }
    // SAFETY: produced by `CString::into_raw` and not freed yet (caller contract)
    drop(unsafe { CString::from_raw(message) });
}

//! Last-error slot for callers that cannot receive `Error` values
//!
//! Persist-until-overwritten: reading never clears the slot, a successful
//! call never touches it, and each failure replaces the previous message.
//! Readers get their own copy, so concurrent readers never race each other
//! for the message.

use parking_lot::Mutex;
use std::ffi::CString;

/// Single-valued holder of the most recent error message
#[derive(Debug, Default)]
pub struct ErrorSlot {
    message: Mutex<Option<CString>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot
    ///
    /// Interior NUL bytes cannot cross a C string boundary and are escaped.
    pub fn record(&self, message: impl Into<String>) {
        let mut message: String = message.into();
        if message.contains('\0') {
            message = message.replace('\0', "\\0");
        }
        let message = CString::new(message).unwrap_or_default();
        *self.message.lock() = Some(message);
    }

    /// Copy of the most recent message, `None` if nothing was ever recorded
    pub fn last(&self) -> Option<CString> {
        self.message.lock().clone()
    }

    /// Empty the slot
    pub fn clear(&self) {
        *self.message.lock() = None;
    }
}

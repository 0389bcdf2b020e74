//! C ABI bindings for ferry-core
//!
//! Everything the host holds is a `u64` handle (0 is null). Fallible calls
//! return a status code or a null handle and leave the message in the
//! last-error slot.
//!
//! Status codes: `0` ok, `-1` invalid pattern, `-2` duplicate route,
//! `-3` bind failure, `-4` already stopped, `-5` unknown handle,
//! `-6` invalid method, `-7` invalid argument, `-8` internal,
//! `-9` no dispatcher.
//!
//! Typical flow:
//! 1. `ferry_set_dispatcher(callback, user_data)`
//! 2. `ferry_router_create` + `ferry_router_register_route`
//! 3. `ferry_server_start_with_router`
//! 4. in the callback: decode the request frame, then
//!    `ferry_request_complete` and `ferry_request_release`
//! 5. `ferry_server_stop`

pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod request;
pub mod router;
pub mod server;
mod state;

pub use dispatcher::{ferry_set_dispatcher, DispatchCallback, ForeignDispatcher};
pub use error::{ferry_error_free, ferry_last_error_message};
pub use logging::ferry_init_logging;
pub use request::{ferry_request_complete, ferry_request_is_cancelled, ferry_request_release};
pub use router::{ferry_router_create, ferry_router_free, ferry_router_register_route};
pub use server::{
    ferry_server_local_port, ferry_server_register_route, ferry_server_start,
    ferry_server_start_with_router, ferry_server_stop,
};

// Use mimalloc for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{contexts, last_error};
    use ferry_core::frame::decode_request;
    use ferry_core::{CompletionContext, ResponseFrame};
    use std::ffi::{c_void, CStr};
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::time::Duration;

    /// The error slot and dispatcher are process-wide
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn last_message() -> Option<String> {
        let raw = ferry_last_error_message();
        if raw.is_null() {
            return None;
        }
        let message = unsafe { CStr::from_ptr(raw) }.to_str().unwrap().to_string();
        unsafe { ferry_error_free(raw) };
        Some(message)
    }

    fn register(router: u64, method: u8, pattern: &str, handler_id: u64) -> i32 {
        unsafe { ferry_router_register_route(router, method, pattern.as_ptr(), pattern.len(), handler_id) }
    }

    fn get(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        write!(stream, "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response);
        response
    }

    #[test]
    fn test_error_message_persists_until_overwritten() {
        let _serial = serial();
        last_error().clear();
        assert!(last_message().is_none());

        let router = ferry_router_create();
        assert_eq!(register(router, 0, "users", 1), -1);
        let first = last_message().unwrap();
        assert!(first.contains("must start with '/'"), "{first}");

        // Success leaves the slot alone, reading does not clear it
        assert_eq!(register(router, 0, "/users", 1), 0);
        assert_eq!(last_message().as_deref(), Some(first.as_str()));
        assert_eq!(last_message().as_deref(), Some(first.as_str()));

        assert_eq!(register(router, 0, "/users/", 2), -2);
        assert_eq!(last_message().unwrap(), "duplicate route: GET /users");
        ferry_router_free(router);
    }

    #[test]
    fn test_register_argument_errors() {
        let _serial = serial();
        let router = ferry_router_create();

        assert_eq!(register(router, 42, "/x", 1), -6);
        assert!(last_message().unwrap().contains("42"));

        let status = unsafe { ferry_router_register_route(router, 0, ptr::null(), 3, 1) };
        assert_eq!(status, -7);

        let bad = [b'/', 0xff, 0xfe];
        let status = unsafe { ferry_router_register_route(router, 0, bad.as_ptr(), bad.len(), 1) };
        assert_eq!(status, -7);
        assert!(last_message().unwrap().contains("UTF-8"));

        assert_eq!(register(router, 0, "/files/*/tail", 1), -1);
        ferry_router_free(router);
    }

    #[test]
    fn test_freed_and_unknown_handles() {
        let _serial = serial();
        let router = ferry_router_create();
        ferry_router_free(router);
        ferry_router_free(router);

        assert_eq!(register(router, 0, "/x", 1), -5);
        assert_eq!(register(0, 0, "/x", 1), -5);
        assert_eq!(ferry_server_start_with_router(0, router), 0);
        assert!(last_message().unwrap().contains("Unknown handle"));

        ferry_server_stop(0);
        ferry_server_stop(0xffff_0000_0000_0001);
        assert_eq!(ferry_server_local_port(12345), 0);
        let status = unsafe {
            ferry_server_register_route(777, 0, "/x".as_ptr(), 2, 1)
        };
        assert_eq!(status, -5);
    }

    #[test]
    fn test_start_on_occupied_port_fails() {
        let _serial = serial();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        assert_eq!(ferry_server_start(port), 0);
        assert!(last_message().unwrap().contains("Failed to bind"));
    }

    #[test]
    fn test_context_exports() {
        let _serial = serial();
        let (ctx, mut rx) = CompletionContext::new(1);
        let handle = contexts().insert(ctx.clone()).raw();
        assert!(!ferry_request_is_cancelled(handle));

        let frame = ResponseFrame::new(200).body("ok").encode().unwrap();
        unsafe { ferry_request_complete(handle, frame.as_ptr(), frame.len()) };
        assert_eq!(rx.try_recv().unwrap(), frame);

        // Second completion is ignored
        unsafe { ferry_request_complete(handle, b"x".as_ptr(), 1) };
        assert!(rx.try_recv().is_err());

        ferry_request_release(handle);
        ferry_request_release(handle);
        assert!(ferry_request_is_cancelled(handle));

        last_error().clear();
        unsafe { ferry_request_complete(handle, frame.as_ptr(), frame.len()) };
        assert!(last_message().unwrap().contains("Unknown handle"));
    }

    #[test]
    fn test_cancellation_visible_through_handle() {
        let _serial = serial();
        let (ctx, _rx) = CompletionContext::new(2);
        let handle = contexts().insert(ctx.clone()).raw();

        ctx.cancel();
        assert!(ferry_request_is_cancelled(handle));
        unsafe { ferry_request_complete(handle, b"late".as_ptr(), 4) };
        assert!(ferry_request_is_cancelled(handle));
        ferry_request_release(handle);
    }

    extern "C" fn greet(user_data: *mut c_void, handler_id: u64, request: *const u8, len: usize, ctx: u64) {
        let calls = unsafe { &*(user_data as *const AtomicUsize) };
        calls.fetch_add(1, Ordering::SeqCst);

        let frame = unsafe { std::slice::from_raw_parts(request, len) };
        let request = decode_request(frame, handler_id).unwrap();
        let body = format!("{} {}", handler_id, request.param("name").unwrap_or("nobody"));
        let response = ResponseFrame::new(200)
            .header("content-type", "text/plain")
            .body(body)
            .encode()
            .unwrap();

        unsafe { ferry_request_complete(ctx, response.as_ptr(), response.len()) };
        ferry_request_release(ctx);
    }

    #[test]
    fn test_end_to_end_through_callback() {
        let _serial = serial();
        let calls = Arc::new(AtomicUsize::new(0));
        ferry_set_dispatcher(Some(greet), Arc::as_ptr(&calls) as *mut c_void);

        let router = ferry_router_create();
        assert_eq!(register(router, 0, "/greet/:name", 7), 0);
        let server = ferry_server_start_with_router(0, router);
        assert_ne!(server, 0, "{:?}", last_message());
        // The server keeps the router alive
        ferry_router_free(router);

        let port = ferry_server_local_port(server);
        assert_ne!(port, 0);

        let response = get(port, "/greet/ada");
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("7 ada"), "{response}");
        assert!(get(port, "/missing").starts_with("HTTP/1.1 404"));

        let late = "/late";
        let status = unsafe { ferry_server_register_route(server, 0, late.as_ptr(), late.len(), 8) };
        assert_eq!(status, 0);
        assert!(get(port, "/late").ends_with("8 nobody"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        ferry_set_dispatcher(None, ptr::null_mut());
        assert!(get(port, "/greet/bob").starts_with("HTTP/1.1 503"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(contexts().is_empty());

        ferry_server_stop(server);
        ferry_server_stop(server);
        assert_eq!(ferry_server_local_port(server), 0);
        assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
    }
}

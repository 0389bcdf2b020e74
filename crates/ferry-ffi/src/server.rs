//! Server lifecycle exports

use crate::dispatcher::ForeignDispatcher;
use crate::logging;
use crate::router::pattern_arg;
use crate::state::{guarded, routers, servers, status};
use ferry_core::{Result, Router, Server, ServerConfig};
use std::sync::Arc;

fn start(port: u16, router: Arc<Router>) -> Result<u64> {
    logging::init();
    let config = ServerConfig::default().port(port);
    let server = Server::start(config, router, Arc::new(ForeignDispatcher))?;
    Ok(servers().insert(Arc::new(server)).raw())
}

/// Start a server with its own empty router on `127.0.0.1:port`
///
/// Returns the server handle, or 0 with the error slot set.
#[no_mangle]
pub extern "C" fn ferry_server_start(port: u16) -> u64 {
    guarded(0, || start(port, Arc::new(Router::new())))
}

/// Start a server sharing an existing router
///
/// The server keeps the router alive even if its handle is freed.
#[no_mangle]
pub extern "C" fn ferry_server_start_with_router(port: u16, router: u64) -> u64 {
    guarded(0, || start(port, routers().get(router)?))
}

/// Stop a server and invalidate its handle
///
/// Pending requests are cancelled and connections get the grace period to
/// drain. Stopping an unknown or already stopped server does nothing.
#[no_mangle]
pub extern "C" fn ferry_server_stop(server: u64) {
    if let Ok(server) = servers().remove(server) {
        let _ = server.stop();
    }
}

/// Register a route on a running server's router
///
/// # Safety
///
/// `pattern` must point to `len` readable bytes for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn ferry_server_register_route(
    server: u64,
    method: u8,
    pattern: *const u8,
    len: usize,
    handler_id: u64,
) -> i32 {
    status(|| {
        let server = servers().get(server)?;
        // SAFETY: forwarded caller contract
        let pattern = unsafe { pattern_arg(pattern, len) }?;
        server.router().register_code(method, pattern, handler_id)
    })
}

/// Port the server is bound to (useful after starting on port 0)
///
/// Returns 0 for an unknown handle.
#[no_mangle]
pub extern "C" fn ferry_server_local_port(server: u64) -> u16 {
    servers()
        .get(server)
        .map_or(0, |server| server.local_addr().port())
}

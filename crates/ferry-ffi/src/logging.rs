//! Log output for hosts that do not install their own subscriber

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives
pub const LOG_ENV: &str = "FERRY_LOG";

/// Install a fmt subscriber filtered by `FERRY_LOG` (default `info`)
///
/// Runs at most once per process. A subscriber the host already installed
/// takes precedence.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init();
    });
}

/// Install the default log subscriber
///
/// Starting a server does this implicitly; call it earlier to see route
/// registration logs.
#[no_mangle]
pub extern "C" fn ferry_init_logging() {
    init();
}

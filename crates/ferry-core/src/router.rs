//! Live router: a [`RouteTable`] published through `ArcSwap`
//!
//! Matching loads the current table without locking. Registration clones
//! the table, inserts into the clone and swaps it in, so a request that is
//! already matching keeps the table it started with.

use crate::{Error, Result};
use arc_swap::ArcSwap;
use ferry_router::{HandlerId, Match, Method, RouteTable};
use parking_lot::Mutex;
use std::sync::Arc;

/// Thread-safe, live-updatable router
pub struct Router {
    table: ArcSwap<RouteTable>,
    /// Serialises writers so concurrent registrations are not lost
    write_lock: Mutex<()>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.table.load().len())
            .finish()
    }
}

impl Router {
    /// Create a router with an empty table
    pub fn new() -> Self {
        Self::from_table(RouteTable::new())
    }

    /// Create a router serving an already built table
    pub fn from_table(table: RouteTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
            write_lock: Mutex::new(()),
        }
    }

    /// Register a route
    ///
    /// On failure the published table is unchanged.
    pub fn register(&self, method: Method, pattern: &str, handler_id: HandlerId) -> Result<()> {
        let _writer = self.write_lock.lock();
        let mut next = RouteTable::clone(&self.table.load());
        next.insert(method, pattern, handler_id)?;
        self.table.store(Arc::new(next));

        tracing::debug!(%method, pattern, handler_id, "route registered");
        Ok(())
    }

    /// Register a route by wire method code
    pub fn register_code(&self, code: u8, pattern: &str, handler_id: HandlerId) -> Result<()> {
        let method = Method::from_u8(code).ok_or(Error::InvalidMethod(code))?;
        self.register(method, pattern, handler_id)
    }

    /// Match a request against the current table
    #[inline]
    pub fn find(&self, method: Method, path: &str) -> Option<Match> {
        self.table.load().find(method, path)
    }

    /// Swap in a freshly built table
    pub fn replace(&self, table: RouteTable) {
        let _writer = self.write_lock.lock();
        tracing::debug!(routes = table.len(), "route table replaced");
        self.table.store(Arc::new(table));
    }

    /// Drop every route (for hot reload)
    pub fn clear(&self) {
        self.replace(RouteTable::new());
    }

    /// Current table
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table.load_full()
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

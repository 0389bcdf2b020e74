//! ferry-core: embeddable HTTP server core
//!
//! Routes requests with [`Router`], hands each one to a [`Dispatcher`]
//! together with a [`CompletionContext`], and writes whatever response the
//! handler side completes the context with.
//!
//! ## Example
//! ```no_run
//! use ferry_core::{CompletionContext, DispatchRequest, Method, ResponseFrame, Router, Server, ServerConfig};
//! use std::sync::Arc;
//!
//! let router = Arc::new(Router::new());
//! router.register(Method::Get, "/hello/:name", 0)?;
//!
//! let server = Server::start(
//!     ServerConfig::default().port(8080),
//!     router,
//!     Arc::new(|req: DispatchRequest, ctx: Arc<CompletionContext>| {
//!         let name = req.param("name").unwrap_or("world").to_string();
//!         if let Ok(frame) = ResponseFrame::new(200).body(format!("hello {name}")).encode() {
//!             ctx.complete(frame);
//!         }
//!     }),
//! )?;
//! # server.stop()?;
//! # Ok::<(), ferry_core::Error>(())
//! ```

#![warn(clippy::all)]

pub mod completion;
pub mod dispatch;
pub mod error;
pub mod error_slot;
pub mod frame;
pub mod handle;
pub mod router;
pub mod server;
mod service;

// Re-exports
pub use completion::{CancelOnDrop, CompletionContext, CompletionState};
pub use dispatch::{DispatchRequest, Dispatcher};
pub use error::{Error, Result};
pub use error_slot::ErrorSlot;
pub use frame::{FrameError, ResponseFrame};
pub use handle::{Handle, HandleArena};
pub use router::Router;
pub use server::{ConnectionTracker, Server, ServerConfig};
pub use service::ConnectionAbort;

pub use ferry_router::{HandlerId, Match, Method, PatternFault, RouteError, RouteTable};

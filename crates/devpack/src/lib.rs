//! devpack: bundler dev-mode integration for a host request pipeline.
//!
//! A development module compiles the application in memory, serves the
//! output through a legacy `(req, res, next)` middleware and pushes build
//! notifications to browsers over a hot-update event stream.
//!
//! # Architecture
//!
//! - [`setup`] - registers the module on a host server
//! - [`adapter`] - bridges legacy middleware to host event handlers
//! - [`legacy`] - the legacy middleware interface and its single-outcome
//!   completion protocol
//! - [`compiler`] - compilation, in-memory assets and watch mode
//! - [`dev_middleware`] - serves compiled assets
//! - [`hot`] - the hot-update event channel
//! - [`host`] - request events, handler registration and dispatch
//!
//! # Example
//!
//! ```no_run
//! use devpack::host::{Dispatcher, ServerOptions};
//! use devpack_config::DevModuleOptions;
//!
//! # async fn run() -> devpack::Result<()> {
//! let mut server = ServerOptions::new(".", ".devpack");
//! let module = devpack::setup(&mut server, &DevModuleOptions::default())?;
//!
//! let addr = "127.0.0.1:3000".parse().expect("valid address");
//! Dispatcher::new(&server).serve(addr, async {}).await?;
//! module.close();
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cli;
pub mod compiler;
pub mod dev_middleware;
pub mod error;
pub mod host;
pub mod hot;
pub mod legacy;
pub mod logger;
pub mod setup;

pub use adapter::{BuildServingAdapter, LegacyHandler};
pub use compiler::{Compiler, Stats};
pub use dev_middleware::{DevMiddleware, DevMiddlewareContext, DevMiddlewareOptions};
pub use error::{BuildError, DevError, Result};
pub use hot::{HotMiddleware, HotMiddlewareOptions};
pub use setup::{DevModule, setup};

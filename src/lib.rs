//! A small asynchronous HTTP/1.x server built around a pattern based
//! request multiplexer.
//!
//! A [`Server`] owns the configuration and a default [`ServeMux`]. Routes
//! are registered on the mux, then [`Server::run`] (or
//! [`Server::listen_and_serve`] with an explicit handler) accepts
//! connections and gives each its own task.
//!
//! ```no_run
//! use rustymux::config::ServerConfig;
//! use rustymux::handler::text;
//! use rustymux::http::status::HttpStatus;
//! use rustymux::Server;
//!
//! # async fn start() -> Result<(), Box<dyn std::error::Error>> {
//! let server = Server::new(ServerConfig::default());
//! server.mux().handle_func("/hello", |res, _req| {
//!     text(res, HttpStatus::Ok, "hello\n");
//! })?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod handler;
pub mod http;
pub mod logging;
pub mod net;

pub use handler::{Handler, HandlerFunc, ServeMux};
pub use net::server::{ConnState, Server, ServerError};

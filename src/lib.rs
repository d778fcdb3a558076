//! Actix-web middleware for Common Log Format and Apache Combined Log Format access logs.
//!
//! Every request produces exactly one line, written once the inner service has produced a
//! response:
//!
//! ```text
//! 203.0.113.5 - - [10/Oct/2000:13:55:36 +0000] "GET http://localhost:8080/foo" 200 - 0.4ms
//! ```
//!
//! # Examples:
//! ## By default middleware uses the standard `log` crate for logging.
//! ```bash
//! crate add actix-web-middleware-accesslog
//! ```
//! Example usage with standard `log` crate and `structured_logger` crate:
//! ```rust
//! use actix_web::{web, App, HttpServer};
//! use actix_web_middleware_accesslog::AccessLogger;
//! use tokio;
//! use structured_logger::{Builder, async_json::new_writer};
//!
//! #[actix_web::main] // or #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     Builder::new()
//!         .with_target_writer("*", new_writer(tokio::io::stdout()))
//!         .init();
//!
//!     HttpServer::new(|| {
//!         App::new()
//!             .wrap(AccessLogger::default())
//!             .route("/", web::get().to(|| async { "Hello world!" }))
//!     })
//!     .bind("127.0.0.1:8080")?;
//!     Ok(())
//! }
//! ```
//! ## Apache Combined Log Format written to stdout
//! ```rust
//! use actix_web::{web, App, HttpServer};
//! use actix_web_middleware_accesslog::{AccessLogger, LogFormat, Sink};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     HttpServer::new(|| {
//!         App::new()
//!             .wrap(
//!                 AccessLogger::new(LogFormat::ApacheCombined)
//!                     .utc(true)
//!                     .sink(Sink::Stdout),
//!             )
//!             .route("/", web::get().to(|| async { "Hello world!" }))
//!     })
//!     .bind("127.0.0.1:8080")?;
//!     Ok(())
//! }
//! ```
//! # Formats
//!
//! - [`LogFormat::Common`]: `host rfc931 authuser [timestamp] "method url" status bytes`
//! - [`LogFormat::ApacheCombined`]: Common fields followed by the quoted `Referer` and
//!   `User-Agent` request headers, or `-` when a header is absent.
//!
//! When duration tracking is on (the default) the handler duration is appended as the last
//! field (`12.3ms`) and the response carries `Server-Timing: handler;dur=12.3`.
//!
//! A format given by name through [`AccessLogger::from_name`] that is not recognised turns
//! the middleware into a pass-through that logs nothing.
//!
//! # Configuration
//!
//! ## Resolvers
//!
//! The rfc931, authuser and bytes fields render `-` unless a resolver is set:
//!
//! ```rust
//! use actix_web_middleware_accesslog::{AccessLogger, ResolutionField, resolver};
//!
//! let logger = AccessLogger::default()
//!     .resolver_rc(ResolutionField::AuthUser, resolver::request_header("x-remote-user"))
//!     .resolver_rc(ResolutionField::Bytes, resolver::body_size());
//! ```
//! ## Path Exclusions
//!
//! Exclude specific paths from logging:
//!
//! ```rust
//! use actix_web_middleware_accesslog::AccessLogger;
//!
//! let logger = AccessLogger::default()
//!     .exclude("/health")
//!     .exclude_regex(r"^/assets/.*");
//! ```
//!
//! # Feature Flags
//!
//! - `log` (default) - Default sink writes through the standard `log` crate, otherwise to stdout

mod format;
mod logger;
pub mod resolver;
mod sink;

pub use crate::format::{LogFormat, UnknownFormat};
pub use crate::logger::{AccessLogger, AccessLoggerMiddlewareService, AccessLoggerResponse};
pub use crate::resolver::{Exchange, ResolutionField, Resolver};
pub use crate::sink::Sink;

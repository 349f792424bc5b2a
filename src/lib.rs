//! # Simple usage
//!
//! ## Creating the connection
//!
//! The easiest way to issue a request is to build a [`Connection`] for the
//! destination and call a verb method on it:
//!
//! ```no_run
//! use wirecall::{Connection, RequestOptions};
//!
//! let connection = Connection::new("http://example.com").unwrap();
//! let response = connection
//!     .get(RequestOptions::new().with_path("/hello"))
//!     .unwrap();
//!
//! println!("{}", String::from_utf8_lossy(&response.body));
//! ```
//!
//! A `Connection` is bound to one scheme/host/port. It keeps one socket
//! per thread alive between requests and reuses it as long as the server
//! keeps the connection open; [`Connection::reset`] closes it early.
//!
//! ## Request options
//!
//! Every request parameter (target, headers, body, framing, timeouts,
//! retry policy) can be set per call or folded into the connection's
//! defaults at construction time:
//!
//! ```no_run
//! use std::time::Duration;
//! use wirecall::{Connection, Method, RequestOptions};
//!
//! let connection = Connection::with_options(
//!     "http://example.com",
//!     RequestOptions::new()
//!         .with_header("User-Agent: wirecall".parse().unwrap())
//!         .with_read_timeout(Duration::from_secs(5)),
//! )
//! .unwrap();
//!
//! let response = connection
//!     .request(
//!         RequestOptions::new()
//!             .with_method(Method::Post)
//!             .with_path("/widgets")
//!             .with_body("name=flange")
//!             .with_expects([201]),
//!     )
//!     .unwrap();
//! # let _ = response;
//! ```
//!
//! ## Streaming
//!
//! A request body can be pulled from a chunk source (sent with chunked
//! transfer encoding), and a response body can be pushed to a sink as it
//! arrives instead of being accumulated:
//!
//! ```no_run
//! use wirecall::{Connection, RequestOptions};
//!
//! let connection = Connection::new("http://example.com").unwrap();
//! connection
//!     .get(RequestOptions::new().with_response_block(|chunk, remaining, total| {
//!         println!("{} bytes ({:?} of {:?} left)", chunk.len(), remaining, total);
//!     }))
//!     .unwrap();
//! ```
//!
//! ## Pipelining and retries
//!
//! [`Connection::requests`] writes a whole batch before reading any
//! response, pairing them FIFO. Requests flagged idempotent are retried
//! on transport-class failures with a fresh socket until their attempt
//! budget runs out.
//!
//! ## Middlewares
//!
//! Each request flows through an ordered [`Middleware`] stack wrapped
//! around the wire layer; middlewares can rewrite the outgoing request,
//! inspect the response, or answer directly without touching the network.

pub use crate::common::{Header, HeaderField, Headers, Method, StatusCode};
pub use crate::connection::Connection;
pub use crate::error::Error;
pub use crate::instrument::{Instrumentor, StandardInstrumentor};
pub use crate::middleware::{Expects, Middleware};
pub use crate::options::{
    Body, Family, Proxy, Query, QueryValue, RequestBlock, RequestOptions, ResponseBlock, Scheme,
};
pub use crate::request::Exchange;
pub use crate::response::Response;

/// Read granularity for bodies and streaming, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1_048_576;

/// Total attempt budget for idempotent requests.
pub const DEFAULT_RETRY_LIMIT: usize = 4;

/// Stock connect/read/write deadline, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

mod common;
mod connection;
mod error;
mod instrument;
mod log;
mod middleware;
mod options;
mod request;
mod response;
mod socket;
#[cfg(feature = "ssl-native-tls")]
mod ssl;
mod util;

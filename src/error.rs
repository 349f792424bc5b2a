use std::io;

use quick_error::quick_error;

use crate::response::Response;

quick_error! {
    /// Error raised while building or performing a request.
    #[derive(Debug)]
    pub enum Error {
        /// An option carried an invalid value, or was given at the wrong
        /// call boundary. Raised before any socket activity.
        Argument(msg: String) {
            display("invalid argument: {}", msg)
        }
        /// The proxy URL is missing its host, port, or scheme.
        ProxyParse(msg: String) {
            display("unable to parse proxy: {}", msg)
        }
        /// The proxy refused the CONNECT tunnel.
        ProxyConnect(status: u16) {
            display("proxy refused tunnel with status {}", status)
        }
        /// An I/O failure on the transport while writing the request or
        /// reading the response.
        Socket(err: io::Error) {
            display("socket error: {}", err)
            cause(err)
        }
        /// A connect, read, or write deadline expired.
        Timeout(err: io::Error) {
            display("timeout: {}", err)
            cause(err)
        }
        /// The response status was not among the expected ones.
        HttpStatus(response: Response) {
            display("unexpected HTTP status: {}", response.status.as_u16())
        }
        /// A stub middleware found no stub matching the request.
        StubNotFound(msg: String) {
            display("no stub matched the request: {}", msg)
        }
    }
}

impl Error {
    /// True for the error classes an idempotent request may be retried on:
    /// transport failures, timeouts, and unexpected HTTP statuses.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Socket(_) | Error::Timeout(_) | Error::HttpStatus(_)
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.kind() {
            // read/write deadlines surface as WouldBlock on unix and
            // TimedOut on windows
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout(err),
            _ => Error::Socket(err),
        }
    }
}

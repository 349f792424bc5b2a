use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::common::{Header, Headers, Method};
use crate::error::Error;
use crate::instrument::Instrumentor;
use crate::middleware::{default_stack, Middleware};
use crate::request::Exchange;

/// Characters escaped when serializing query values; the unreserved set
/// of RFC 3986 passes through.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// URL scheme the connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, formatter: &mut Formatter) -> Result<(), fmt::Error> {
        write!(formatter, "{}", self.as_str())
    }
}

/// Address family hint forwarded to name resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// Value side of one query pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// Emits the bare key with no `=`.
    Empty,
    One(String),
    Many(Vec<String>),
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> QueryValue {
        QueryValue::One(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> QueryValue {
        QueryValue::One(value)
    }
}

/// Query component of the request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Appended verbatim after `?`.
    Raw(String),
    /// Serialized pair by pair, in order, with values percent-encoded.
    Pairs(Vec<(String, QueryValue)>),
}

impl Query {
    /// The `?`-prefixed wire form, or an empty string when there is
    /// nothing to emit.
    pub(crate) fn to_wire(&self) -> String {
        match self {
            Query::Raw(raw) => format!("?{}", raw),
            Query::Pairs(pairs) => {
                let mut out = String::new();
                for (key, value) in pairs {
                    match value {
                        QueryValue::Empty => {
                            out.push_str(key);
                            out.push('&');
                        }
                        QueryValue::One(value) => {
                            out.push_str(key);
                            out.push('=');
                            out.extend(utf8_percent_encode(value, QUERY_ENCODE));
                            out.push('&');
                        }
                        QueryValue::Many(values) => {
                            for value in values {
                                out.push_str(key);
                                out.push('=');
                                out.extend(utf8_percent_encode(value, QUERY_ENCODE));
                                out.push('&');
                            }
                        }
                    }
                }
                if out.is_empty() {
                    return out;
                }
                out.pop();
                format!("?{}", out)
            }
        }
    }
}

impl From<&str> for Query {
    fn from(raw: &str) -> Query {
        Query::Raw(raw.to_string())
    }
}

impl From<String> for Query {
    fn from(raw: String) -> Query {
        Query::Raw(raw)
    }
}

/// Request payload.
#[derive(Debug)]
pub enum Body {
    Bytes(Vec<u8>),
    /// Streamed from disk in `chunk_size` slices after a rewind; the
    /// `Content-Length` comes from file metadata.
    File(File),
}

impl Body {
    pub(crate) fn len(&self) -> u64 {
        match self {
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File(file) => file.metadata().map(|m| m.len()).unwrap_or(0),
        }
    }
}

impl From<&str> for Body {
    fn from(body: &str) -> Body {
        Body::Bytes(body.as_bytes().to_vec())
    }
}

impl From<String> for Body {
    fn from(body: String) -> Body {
        Body::Bytes(body.into_bytes())
    }
}

impl From<Vec<u8>> for Body {
    fn from(body: Vec<u8>) -> Body {
        Body::Bytes(body)
    }
}

impl From<&[u8]> for Body {
    fn from(body: &[u8]) -> Body {
        Body::Bytes(body.to_vec())
    }
}

impl From<File> for Body {
    fn from(file: File) -> Body {
        Body::File(file)
    }
}

/// Proxy the connection dials instead of the destination host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    pub scheme: Scheme,
    pub host: String,
    pub port: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Proxy {
    /// Parses a proxy URL. The URL must carry a scheme, a host, and a
    /// port (possibly implied by the scheme); userinfo is percent-decoded.
    pub fn parse(input: &str) -> Result<Proxy, Error> {
        let url =
            Url::parse(input).map_err(|err| Error::ProxyParse(format!("{:?}: {}", input, err)))?;

        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(Error::ProxyParse(format!(
                    "unsupported proxy scheme {:?}",
                    other
                )))
            }
        };

        let host = match url.host_str() {
            Some(host) => host.to_string(),
            None => return Err(Error::ProxyParse(format!("{:?} has no host", input))),
        };

        let port = match url.port_or_known_default() {
            Some(port) => port.to_string(),
            None => return Err(Error::ProxyParse(format!("{:?} has no port", input))),
        };

        let user = match url.username() {
            "" => None,
            user => Some(percent_decode(user)?),
        };
        let password = match url.password() {
            None => None,
            Some(password) => Some(percent_decode(password)?),
        };

        Ok(Proxy {
            scheme,
            host,
            port,
            user,
            password,
        })
    }
}

pub(crate) fn percent_decode(input: &str) -> Result<String, Error> {
    percent_encoding::percent_decode_str(input)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::Argument(format!("{:?} does not percent-decode to UTF-8", input)))
}

/// `user:password` encoded for a Basic credentials header. The output is
/// base64 without line breaks, so it can never smuggle CR or LF into a
/// header value.
pub(crate) fn basic_credentials(user: &str, password: &str) -> String {
    base64::encode(format!("{}:{}", user, password))
}

/// Pull source for a chunked upload; a returned empty chunk ends the body.
pub type RequestBlock = Box<dyn FnMut() -> Vec<u8> + Send>;

/// Push sink for a streamed download, called per chunk with
/// `(chunk, remaining, total)`; the two counters are `None` when the
/// framing mode cannot know them.
pub type ResponseBlock = Box<dyn FnMut(&[u8], Option<u64>, Option<u64>) + Send>;

pub(crate) enum ProxySetting {
    Url(String),
    Record(Proxy),
}

/// Per-call (and construction-time) overrides for a [`Connection`].
///
/// Built with `with_*` methods:
///
/// ```
/// use wirecall::{Method, RequestOptions};
///
/// let options = RequestOptions::new()
///     .with_method(Method::Post)
///     .with_path("/api/widgets")
///     .with_body("42")
///     .with_expects([200]);
/// ```
///
/// [`Connection`]: crate::Connection
#[derive(Default)]
pub struct RequestOptions {
    pub(crate) method: Option<Method>,
    pub(crate) scheme: Option<Scheme>,
    pub(crate) host: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) path: Option<String>,
    pub(crate) query: Option<Query>,
    pub(crate) headers: Headers,
    pub(crate) body: Option<Body>,
    pub(crate) request_block: Option<RequestBlock>,
    pub(crate) response_block: Option<ResponseBlock>,
    pub(crate) chunk_size: Option<usize>,
    pub(crate) expects: Option<Vec<u16>>,
    pub(crate) idempotent: Option<bool>,
    pub(crate) retry_limit: Option<usize>,
    pub(crate) retries_remaining: Option<usize>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
    pub(crate) user: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) proxy: Option<ProxySetting>,
    pub(crate) ssl_ca_file: Option<PathBuf>,
    pub(crate) ssl_verify_peer: Option<bool>,
    pub(crate) family: Option<Family>,
    pub(crate) nonblock: Option<bool>,
    pub(crate) instrumentor: Option<Arc<dyn Instrumentor>>,
    pub(crate) instrumentor_name: Option<String>,
    pub(crate) middlewares: Option<Vec<Arc<dyn Middleware>>>,
    pub(crate) pipeline: bool,
}

impl RequestOptions {
    pub fn new() -> RequestOptions {
        RequestOptions::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_path<S: Into<String>>(mut self, path: S) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_query<Q: Into<Query>>(mut self, query: Q) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Appends one header; repeated fields emit repeated lines.
    pub fn with_header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body<B: Into<Body>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Streams the request body from a pull source; forces
    /// `Transfer-Encoding: chunked`. The source ends the body by
    /// returning an empty chunk.
    pub fn with_request_block<F>(mut self, block: F) -> Self
    where
        F: FnMut() -> Vec<u8> + Send + 'static,
    {
        self.request_block = Some(Box::new(block));
        self
    }

    /// Streams the response body to a sink instead of accumulating it,
    /// as long as the response status is expected.
    pub fn with_response_block<F>(mut self, block: F) -> Self
    where
        F: FnMut(&[u8], Option<u64>, Option<u64>) + Send + 'static,
    {
        self.response_block = Some(Box::new(block));
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Statuses accepted without an [`Error::HttpStatus`].
    pub fn with_expects<E: IntoIterator<Item = u16>>(mut self, expects: E) -> Self {
        self.expects = Some(expects.into_iter().collect());
        self
    }

    /// Marks the request safe to retry on transport-class failures.
    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = Some(idempotent);
        self
    }

    /// Total attempt budget for idempotent retries.
    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.retry_limit = Some(retry_limit);
        self
    }

    pub fn with_retries_remaining(mut self, retries_remaining: usize) -> Self {
        self.retries_remaining = Some(retries_remaining);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Basic auth user, emitted as an `Authorization` header unless one
    /// is already set.
    pub fn with_user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(ProxySetting::Record(proxy));
        self
    }

    /// Proxy given as a URL; parsed (and validated) when the connection
    /// is built.
    pub fn with_proxy_url<S: Into<String>>(mut self, url: S) -> Self {
        self.proxy = Some(ProxySetting::Url(url.into()));
        self
    }

    pub fn with_ssl_ca_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ssl_ca_file = Some(path.into());
        self
    }

    pub fn with_ssl_verify_peer(mut self, verify: bool) -> Self {
        self.ssl_verify_peer = Some(verify);
        self
    }

    pub fn with_family(mut self, family: Family) -> Self {
        self.family = Some(family);
        self
    }

    /// Opaque hint forwarded to the socket layer.
    pub fn with_nonblock(mut self, nonblock: bool) -> Self {
        self.nonblock = Some(nonblock);
        self
    }

    pub fn with_instrumentor(mut self, instrumentor: Arc<dyn Instrumentor>) -> Self {
        self.instrumentor = Some(instrumentor);
        self
    }

    pub fn with_instrumentor_name<S: Into<String>>(mut self, name: S) -> Self {
        self.instrumentor_name = Some(name.into());
        self
    }

    /// Replaces the middleware stack; the first entry is the outermost.
    pub fn with_middlewares(mut self, middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        self.middlewares = Some(middlewares);
        self
    }
}

/// The resolved request parameters a [`Connection`] was built with.
///
/// [`Connection`]: crate::Connection
pub(crate) struct Defaults {
    pub scheme: Scheme,
    pub host: String,
    pub port: String,
    pub path: String,
    pub query: Option<Query>,
    pub method: Method,
    pub headers: Headers,
    pub chunk_size: usize,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub expects: Option<Vec<u16>>,
    pub idempotent: bool,
    pub retry_limit: usize,
    pub retries_remaining: Option<usize>,
    pub proxy: Option<Proxy>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl_ca_file: Option<PathBuf>,
    pub ssl_verify_peer: bool,
    pub family: Option<Family>,
    pub nonblock: bool,
    pub instrumentor: Option<Arc<dyn Instrumentor>>,
    pub instrumentor_name: String,
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

impl Defaults {
    pub fn new(scheme: Scheme, host: String, port: String, path: String) -> Defaults {
        Defaults {
            scheme,
            host,
            port,
            path,
            query: None,
            method: Method::Get,
            headers: Headers::new(),
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            connect_timeout: Some(Duration::from_secs(crate::DEFAULT_TIMEOUT_SECS)),
            read_timeout: Some(Duration::from_secs(crate::DEFAULT_TIMEOUT_SECS)),
            write_timeout: Some(Duration::from_secs(crate::DEFAULT_TIMEOUT_SECS)),
            expects: None,
            idempotent: false,
            retry_limit: crate::DEFAULT_RETRY_LIMIT,
            retries_remaining: None,
            proxy: None,
            user: None,
            password: None,
            ssl_ca_file: None,
            ssl_verify_peer: true,
            family: None,
            nonblock: false,
            instrumentor: None,
            instrumentor_name: "wirecall".to_string(),
            middlewares: default_stack(),
        }
    }

    /// Folds construction-time overrides in. Per-request payloads have no
    /// meaning here and are rejected before any socket exists.
    pub fn apply(&mut self, options: RequestOptions) -> Result<(), Error> {
        if options.body.is_some() || options.request_block.is_some() {
            return Err(Error::Argument(
                "request bodies are per-request options".to_string(),
            ));
        }
        if options.response_block.is_some() {
            return Err(Error::Argument(
                "response sinks are per-request options".to_string(),
            ));
        }
        if options.pipeline {
            return Err(Error::Argument(
                "pipelining is driven by `requests`".to_string(),
            ));
        }

        if let Some(scheme) = options.scheme {
            self.scheme = scheme;
        }
        if let Some(host) = options.host {
            self.host = host;
        }
        if let Some(port) = options.port {
            self.port = port.to_string();
        }
        if let Some(path) = options.path {
            self.path = path;
        }
        if let Some(query) = options.query {
            self.query = Some(query);
        }
        if let Some(method) = options.method {
            self.method = method;
        }
        for header in &options.headers {
            self.headers.remove(header.field.as_str().as_str());
        }
        for header in options.headers {
            self.headers.push(header);
        }
        if let Some(chunk_size) = options.chunk_size {
            self.chunk_size = chunk_size;
        }
        if let Some(timeout) = options.connect_timeout {
            self.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = options.read_timeout {
            self.read_timeout = Some(timeout);
        }
        if let Some(timeout) = options.write_timeout {
            self.write_timeout = Some(timeout);
        }
        if let Some(expects) = options.expects {
            self.expects = Some(expects);
        }
        if let Some(idempotent) = options.idempotent {
            self.idempotent = idempotent;
        }
        if let Some(retry_limit) = options.retry_limit {
            self.retry_limit = retry_limit;
        }
        if let Some(retries_remaining) = options.retries_remaining {
            self.retries_remaining = Some(retries_remaining);
        }
        match options.proxy {
            Some(ProxySetting::Record(proxy)) => self.proxy = Some(proxy),
            Some(ProxySetting::Url(url)) => self.proxy = Some(Proxy::parse(&url)?),
            None => {}
        }
        if let Some(user) = options.user {
            self.user = Some(user);
        }
        if let Some(password) = options.password {
            self.password = Some(password);
        }
        if let Some(path) = options.ssl_ca_file {
            self.ssl_ca_file = Some(path);
        }
        if let Some(verify) = options.ssl_verify_peer {
            self.ssl_verify_peer = verify;
        }
        if let Some(family) = options.family {
            self.family = Some(family);
        }
        if let Some(nonblock) = options.nonblock {
            self.nonblock = nonblock;
        }
        if let Some(instrumentor) = options.instrumentor {
            self.instrumentor = Some(instrumentor);
        }
        if let Some(name) = options.instrumentor_name {
            self.instrumentor_name = name;
        }
        if let Some(middlewares) = options.middlewares {
            self.middlewares = middlewares;
        }

        Ok(())
    }

    /// Merges per-request overrides over these defaults into the record
    /// that flows through the middleware stack. Headers merge one level
    /// deeper: override fields replace default fields of the same name,
    /// everything else is kept. Neither side is mutated.
    pub fn merge(&self, options: RequestOptions) -> Result<Exchange, Error> {
        for (given, name) in [
            (options.scheme.is_some(), "scheme"),
            (options.host.is_some(), "host"),
            (options.port.is_some(), "port"),
            (options.user.is_some(), "user"),
            (options.password.is_some(), "password"),
            (options.proxy.is_some(), "proxy"),
            (options.ssl_ca_file.is_some(), "ssl_ca_file"),
            (options.ssl_verify_peer.is_some(), "ssl_verify_peer"),
            (options.family.is_some(), "family"),
            (options.nonblock.is_some(), "nonblock"),
        ]
        .iter()
        {
            if *given {
                return Err(Error::Argument(format!(
                    "{} binds the connection to its destination; set it when building the Connection",
                    name
                )));
            }
        }

        // override fields displace default fields of the same name, but
        // repeated override entries all survive as repeated lines
        let mut headers = self.headers.clone();
        for header in &options.headers {
            headers.remove(header.field.as_str().as_str());
        }
        for header in options.headers {
            headers.push(header);
        }

        let retry_limit = options.retry_limit.unwrap_or(self.retry_limit);
        let retries_remaining = options
            .retries_remaining
            .or(self.retries_remaining)
            .unwrap_or(retry_limit);

        Ok(Exchange {
            method: options.method.unwrap_or_else(|| self.method.clone()),
            scheme: self.scheme,
            host: self.host.clone(),
            port: self.port.clone(),
            path: options.path.unwrap_or_else(|| self.path.clone()),
            query: options.query.or_else(|| self.query.clone()),
            headers,
            body: options.body,
            request_block: options.request_block,
            response_block: options.response_block,
            chunk_size: options.chunk_size.unwrap_or(self.chunk_size),
            expects: options.expects.or_else(|| self.expects.clone()),
            idempotent: options.idempotent.unwrap_or(self.idempotent),
            retry_limit,
            retries_remaining,
            connect_timeout: options.connect_timeout.or(self.connect_timeout),
            read_timeout: options.read_timeout.or(self.read_timeout),
            write_timeout: options.write_timeout.or(self.write_timeout),
            proxy: self.proxy.clone(),
            pipeline: options.pipeline,
            response: None,
            middlewares: options
                .middlewares
                .unwrap_or_else(|| self.middlewares.clone()),
            instrumentor: options.instrumentor.or_else(|| self.instrumentor.clone()),
            instrumentor_name: options
                .instrumentor_name
                .unwrap_or_else(|| self.instrumentor_name.clone()),
        })
    }
}

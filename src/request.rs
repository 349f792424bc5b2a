use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

use chunked_transfer::Encoder;

use crate::common::{Header, Headers, Method};
use crate::error::Error;
use crate::instrument::Instrumentor;
use crate::middleware::Middleware;
use crate::options::{Body, Proxy, Query, RequestBlock, ResponseBlock, Scheme};
use crate::response::Response;

/// The mutable request/response record threaded through the middleware
/// stack and the wire layer.
///
/// Middlewares see and may mutate every field; a middleware that fills in
/// [`response`](Exchange::response) during `request_call` short-circuits
/// the wire entirely.
pub struct Exchange {
    pub method: Method,
    pub scheme: Scheme,
    pub host: String,
    /// Kept as a string for uniform use in `Host` headers and cache keys.
    pub port: String,
    pub path: String,
    pub query: Option<Query>,
    pub headers: Headers,
    pub body: Option<Body>,
    /// Pull source for a chunked upload; forces chunked encoding.
    pub request_block: Option<RequestBlock>,
    /// Push sink for a streamed download.
    pub response_block: Option<ResponseBlock>,
    pub chunk_size: usize,
    pub expects: Option<Vec<u16>>,
    pub idempotent: bool,
    pub retry_limit: usize,
    pub retries_remaining: usize,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub proxy: Option<Proxy>,
    /// When set, the connection defers the response read to a later
    /// drain; writes still happen in call order.
    pub pipeline: bool,
    pub response: Option<Response>,
    pub middlewares: Vec<Arc<dyn Middleware>>,
    pub instrumentor: Option<Arc<dyn Instrumentor>>,
    pub instrumentor_name: String,
}

impl Exchange {
    /// The request target as it appears on the wire: absolute-form when
    /// the request goes through a proxy in the clear, origin-form
    /// otherwise (a tunneled https request already addressed the proxy).
    fn wire_target(&self) -> String {
        let query = self
            .query
            .as_ref()
            .map(|q| q.to_wire())
            .unwrap_or_default();

        if self.proxy.is_some() && self.scheme == Scheme::Http {
            format!(
                "{}://{}:{}{}{}",
                self.scheme, self.host, self.port, self.path, query
            )
        } else {
            format!("{}{}", self.path, query)
        }
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Exchange")
            .field("method", &self.method)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers.redacted())
            .field("expects", &self.expects)
            .field("idempotent", &self.idempotent)
            .field("retries_remaining", &self.retries_remaining)
            .field("pipeline", &self.pipeline)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

/// Emits the request onto the wire: request line, framing headers, header
/// lines in insertion order, the blank line, then the body. Returns
/// without writing anything when an upstream middleware already produced
/// a response.
pub(crate) fn write_request<W: Write>(exchange: &mut Exchange, writer: &mut W) -> Result<(), Error> {
    if exchange.response.is_some() {
        return Ok(());
    }

    write!(
        writer,
        "{} {} HTTP/1.1\r\n",
        exchange.method,
        exchange.wire_target()
    )?;

    // framing: a chunk source forces chunked encoding and forbids
    // Content-Length; everything else is sized, except GET with no body
    if exchange.request_block.is_some() {
        if !exchange.headers.contains("Transfer-Encoding") {
            exchange
                .headers
                .push(Header::from_bytes(&b"Transfer-Encoding"[..], &b"chunked"[..]).unwrap());
        }
        exchange.headers.remove("Content-Length");
    } else if !(exchange.method == Method::Get && exchange.body.is_none())
        && !exchange.headers.contains("Content-Length")
    {
        let length = exchange.body.as_ref().map(|body| body.len()).unwrap_or(0);
        exchange.headers.push(
            Header::from_bytes(
                &b"Content-Length"[..],
                length.to_string().into_bytes(),
            )
            .unwrap(),
        );
    }

    for header in exchange.headers.iter() {
        writer.write_all(header.field.as_str().as_bytes())?;
        write!(writer, ": ")?;
        writer.write_all(header.value.as_bytes())?;
        write!(writer, "\r\n")?;
    }
    write!(writer, "\r\n")?;

    if let Some(block) = exchange.request_block.as_mut() {
        // one wire chunk per pulled chunk; dropping the encoder emits the
        // terminating zero-size chunk exactly once
        let mut encoder = Encoder::with_chunks_size(writer.by_ref(), exchange.chunk_size);
        loop {
            let chunk = block();
            if chunk.is_empty() {
                break;
            }
            encoder.write_all(&chunk)?;
            encoder.flush()?;
        }
    } else {
        match exchange.body.as_mut() {
            Some(Body::Bytes(bytes)) => {
                if !bytes.is_empty() {
                    writer.write_all(bytes)?;
                }
            }
            Some(Body::File(file)) => {
                file.seek(SeekFrom::Start(0))?;
                let mut buffer = vec![0; exchange.chunk_size];
                loop {
                    let read = file.read(&mut buffer)?;
                    if read == 0 {
                        break;
                    }
                    writer.write_all(&buffer[..read])?;
                }
            }
            None => {}
        }
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::write_request;
    use crate::common::{Headers, Method, StatusCode};
    use crate::options::{Defaults, Query, QueryValue, RequestOptions, Scheme};
    use crate::response::Response;

    fn defaults() -> Defaults {
        Defaults::new(
            Scheme::Http,
            "h".to_string(),
            "80".to_string(),
            "/p".to_string(),
        )
    }

    fn written(defaults: &Defaults, options: RequestOptions) -> String {
        let mut exchange = defaults.merge(options).unwrap();
        if !exchange.headers.contains("Host") {
            exchange
                .headers
                .push("Host: h:80".parse().unwrap());
        }
        let mut wire = Vec::new();
        write_request(&mut exchange, &mut wire).unwrap();
        String::from_utf8(wire).unwrap()
    }

    #[test]
    fn get_without_body_has_no_content_length() {
        let wire = written(&defaults(), RequestOptions::new());
        assert_eq!(wire, "GET /p HTTP/1.1\r\nHost: h:80\r\n\r\n");
    }

    #[test]
    fn post_with_body_is_sized() {
        let wire = written(
            &defaults(),
            RequestOptions::new()
                .with_method(Method::Post)
                .with_body("ab"),
        );
        assert_eq!(
            wire,
            "POST /p HTTP/1.1\r\nHost: h:80\r\nContent-Length: 2\r\n\r\nab"
        );
    }

    #[test]
    fn head_without_body_is_sized_zero() {
        let wire = written(&defaults(), RequestOptions::new().with_method(Method::Head));
        assert!(wire.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn chunk_source_forces_chunked_encoding() {
        let mut chunks = vec![Vec::new(), b"hi".to_vec()];
        let wire = written(
            &defaults(),
            RequestOptions::new()
                .with_method(Method::Put)
                .with_header("Content-Length: 99".parse().unwrap())
                .with_request_block(move || chunks.pop().unwrap_or_default()),
        );

        assert!(wire.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!wire.contains("Content-Length"));
        assert!(wire.ends_with("\r\n\r\n2\r\nhi\r\n0\r\n\r\n"));
    }

    #[test]
    fn proxied_http_uses_absolute_target() {
        let mut defaults = defaults();
        defaults
            .apply(RequestOptions::new().with_proxy_url("http://px:3128"))
            .unwrap();
        let wire = written(&defaults, RequestOptions::new());
        assert!(wire.starts_with("GET http://h:80/p HTTP/1.1\r\n"));
    }

    #[test]
    fn query_mapping_is_serialized_in_order() {
        let wire = written(
            &defaults(),
            RequestOptions::new().with_query(Query::Pairs(vec![
                ("a".to_string(), QueryValue::One("1".to_string())),
                (
                    "b".to_string(),
                    QueryValue::Many(vec!["2".to_string(), "3".to_string()]),
                ),
                ("c".to_string(), QueryValue::Empty),
            ])),
        );
        assert!(wire.starts_with("GET /p?a=1&b=2&b=3&c HTTP/1.1\r\n"));
    }

    #[test]
    fn populated_response_short_circuits_the_writer() {
        let mut exchange = defaults().merge(RequestOptions::new()).unwrap();
        exchange.response = Some(Response {
            status: StatusCode(200),
            headers: Headers::new(),
            body: Vec::new(),
            remote_ip: None,
        });

        let mut wire = Vec::new();
        write_request(&mut exchange, &mut wire).unwrap();
        assert!(wire.is_empty());
    }

    #[test]
    fn repeated_header_fields_emit_repeated_lines() {
        let wire = written(
            &defaults(),
            RequestOptions::new()
                .with_header("X-Tag: one".parse().unwrap())
                .with_header("X-Tag: two".parse().unwrap()),
        );
        assert!(wire.contains("X-Tag: one\r\nX-Tag: two\r\n"));
    }
}

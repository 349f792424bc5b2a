use std::io::{self, BufRead};
use std::str::FromStr;

use crate::common::{Header, Headers, Method, StatusCode};
use crate::error::Error;
use crate::request::Exchange;
use crate::util::ChunkReader;

/// A parsed HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Headers,
    /// Stays empty when the body was streamed to a response sink.
    pub body: Vec<u8>,
    pub remote_ip: Option<String>,
}

impl Response {
    /// Value of the first header matching `field`, if any.
    pub fn header(&self, field: &str) -> Option<&str> {
        self.headers.get(field)
    }

    /// True when the server asked for the connection to be closed.
    pub(crate) fn wants_close(&self) -> bool {
        self.headers
            .get("Connection")
            .map_or(false, |value| value.eq_ignore_ascii_case("close"))
    }
}

/// How the body is delimited on the wire.
enum Framing {
    Chunked,
    ContentLength(u64),
    ReadToClose,
}

/// Ingests the response for `exchange` from the socket: status line,
/// headers, then the body under the framing the headers selected. Does
/// nothing when a middleware already populated the response.
pub(crate) fn read_response<R: BufRead>(
    exchange: &mut Exchange,
    reader: &mut R,
    remote_ip: Option<String>,
) -> Result<(), Error> {
    if exchange.response.is_some() {
        return Ok(());
    }

    // the three status digits sit at a fixed offset in the first twelve
    // bytes; the rest of the line is noise
    let mut prefix = [0; 12];
    reader.read_exact(&mut prefix)?;
    let status: u16 = std::str::from_utf8(&prefix[9..])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| {
            Error::Socket(io::Error::new(
                io::ErrorKind::InvalidData,
                "malformed status line",
            ))
        })?;
    read_crlf_line(reader)?;

    let mut headers = Headers::new();
    let mut content_length: Option<u64> = None;
    let mut chunked = false;

    loop {
        let line = read_crlf_line(reader)?;
        if line.is_empty() {
            break;
        }

        let header = parse_header_line(&line)?;

        if header.field.equiv("Content-Length") {
            content_length = u64::from_str(header.value.as_str().trim()).ok();
        } else if header.field.equiv("Transfer-Encoding")
            && header.value.as_str().trim().eq_ignore_ascii_case("chunked")
        {
            chunked = true;
        }

        headers.append_joined(header);
    }

    let framing = if chunked {
        Framing::Chunked
    } else if let Some(length) = content_length {
        Framing::ContentLength(length)
    } else {
        Framing::ReadToClose
    };

    let status = StatusCode(status);
    let skip_body = status.bodyless()
        || exchange.method == Method::Head
        || exchange.method == Method::Connect;

    let mut body = Vec::new();

    if !skip_body {
        let expected = exchange
            .expects
            .as_ref()
            .map_or(true, |expects| expects.contains(&status.as_u16()));

        // unexpected responses always accumulate, so the error carries
        // the body instead of feeding it to the sink
        let mut sink = if expected {
            exchange.response_block.as_mut()
        } else {
            None
        };
        let mut deliver = |chunk: &[u8], remaining: Option<u64>, total: Option<u64>| {
            match sink.as_mut() {
                Some(sink) => sink(chunk, remaining, total),
                None => body.extend_from_slice(chunk),
            }
        };

        match framing {
            Framing::Chunked => {
                let mut chunks = ChunkReader::new(reader.by_ref());
                while let Some(chunk) = chunks.next_chunk()? {
                    deliver(&chunk, None, None);
                }
            }
            Framing::ContentLength(total) => {
                let mut remaining = total;
                let mut buffer = vec![0; exchange.chunk_size.min(total as usize).max(1)];
                while remaining > 0 {
                    let want = (exchange.chunk_size as u64).min(remaining) as usize;
                    let read = reader.read(&mut buffer[..want])?;
                    if read == 0 {
                        return Err(Error::Socket(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "body ended before the declared Content-Length",
                        )));
                    }
                    remaining -= read as u64;
                    deliver(&buffer[..read], Some(remaining), Some(total));
                }
            }
            Framing::ReadToClose => {
                let mut buffer = vec![0; exchange.chunk_size];
                loop {
                    let read = reader.read(&mut buffer)?;
                    if read == 0 {
                        break;
                    }
                    deliver(&buffer[..read], Some(read as u64), None);
                }
            }
        }
    }

    exchange.response = Some(Response {
        status,
        headers,
        body,
        remote_ip,
    });

    Ok(())
}

/// Reads one CRLF-terminated line, returning it without the terminator.
fn read_crlf_line<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, Error> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;

    if line.pop() != Some(b'\n') || line.pop() != Some(b'\r') {
        return Err(Error::Socket(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "header line is not CRLF terminated",
        )));
    }

    Ok(line)
}

/// Splits a raw header line at the first `:`, dropping optional spaces
/// after it.
fn parse_header_line(line: &[u8]) -> Result<Header, Error> {
    let text = std::str::from_utf8(line).map_err(|_| {
        Error::Socket(io::Error::new(
            io::ErrorKind::InvalidData,
            "header line is not UTF-8",
        ))
    })?;

    let mut elems = text.splitn(2, ':');
    let field = elems.next().unwrap_or("");
    let value = elems.next().map(|v| v.trim_start_matches(' ')).unwrap_or("");

    Header::from_bytes(field.as_bytes(), value.as_bytes()).map_err(|_| {
        Error::Socket(io::Error::new(
            io::ErrorKind::InvalidData,
            "header line is not ASCII",
        ))
    })
}

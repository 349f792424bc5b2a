use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use crate::error::Error;
use crate::log::debug;
use crate::options::{Family, Proxy, Scheme};
#[cfg(feature = "ssl-native-tls")]
use crate::ssl::SslStream;

thread_local! {
    // one reusable socket per destination per thread
    static SOCKETS: RefCell<HashMap<String, Socket>> = RefCell::new(HashMap::new());
}

/// Removes the cached socket for `key`, handing ownership to the caller.
/// The caller puts it back with [`checkin`] once the socket is known to
/// still be reusable.
pub(crate) fn checkout(key: &str) -> Option<Socket> {
    SOCKETS.with(|sockets| sockets.borrow_mut().remove(key))
}

pub(crate) fn checkin(key: &str, socket: Socket) {
    SOCKETS.with(|sockets| {
        sockets.borrow_mut().insert(key.to_string(), socket);
    });
}

/// Drops the cached socket for `key`, closing it. Idempotent.
pub(crate) fn evict(key: &str) {
    let evicted = SOCKETS.with(|sockets| sockets.borrow_mut().remove(key));
    if evicted.is_some() {
        debug!("closed connection to {}", key);
    }
}

/// Everything the transport needs to reach the destination.
pub(crate) struct SocketConfig<'a> {
    pub scheme: Scheme,
    pub host: &'a str,
    pub port: &'a str,
    pub proxy: Option<&'a Proxy>,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub family: Option<Family>,
    pub nonblock: bool,
    #[cfg_attr(not(feature = "ssl-native-tls"), allow(dead_code))]
    pub ssl_ca_file: Option<&'a Path>,
    #[cfg_attr(not(feature = "ssl-native-tls"), allow(dead_code))]
    pub ssl_verify_peer: bool,
}

pub(crate) enum Stream {
    Http(TcpStream),
    #[cfg(feature = "ssl-native-tls")]
    Https(SslStream),
}

impl Stream {
    fn try_clone(&self) -> io::Result<Stream> {
        match self {
            Stream::Http(stream) => stream.try_clone().map(Stream::Http),
            #[cfg(feature = "ssl-native-tls")]
            Stream::Https(stream) => Ok(Stream::Https(stream.clone())),
        }
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Stream::Http(stream) => stream.peer_addr(),
            #[cfg(feature = "ssl-native-tls")]
            Stream::Https(stream) => stream.peer_addr(),
        }
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Http(stream) => stream.set_read_timeout(timeout),
            #[cfg(feature = "ssl-native-tls")]
            Stream::Https(stream) => stream.set_read_timeout(timeout),
        }
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Stream::Http(stream) => stream.set_write_timeout(timeout),
            #[cfg(feature = "ssl-native-tls")]
            Stream::Https(stream) => stream.set_write_timeout(timeout),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Http(stream) => stream.read(buf),
            #[cfg(feature = "ssl-native-tls")]
            Stream::Https(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Http(stream) => stream.write(buf),
            #[cfg(feature = "ssl-native-tls")]
            Stream::Https(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Http(stream) => stream.flush(),
            #[cfg(feature = "ssl-native-tls")]
            Stream::Https(stream) => stream.flush(),
        }
    }
}

/// A live transport split into buffered read and write halves over the
/// same underlying stream. Closing happens on drop.
pub(crate) struct Socket {
    reader: BufReader<Stream>,
    writer: BufWriter<Stream>,
    remote_ip: Option<String>,
}

impl Socket {
    pub fn open(config: &SocketConfig<'_>) -> Result<Socket, Error> {
        // with a proxy we dial the proxy and either speak absolute-form
        // (http) or tunnel (https) through it
        let (dial_host, dial_port) = match config.proxy {
            Some(proxy) => (proxy.host.as_str(), proxy.port.as_str()),
            None => (config.host, config.port),
        };

        let tcp = connect_tcp(dial_host, dial_port, config)?;
        tcp.set_nodelay(true).ok();
        tcp.set_read_timeout(config.read_timeout)?;
        tcp.set_write_timeout(config.write_timeout)?;
        if config.nonblock {
            debug!("nonblock hint has no effect on the blocking transport");
        }

        let stream = match config.scheme {
            Scheme::Http => Stream::Http(tcp),
            Scheme::Https => https_stream(tcp, config)?,
        };

        let remote_ip = stream.peer_addr().ok().map(|addr| addr.ip().to_string());
        let reader = BufReader::with_capacity(1024, stream.try_clone()?);
        let writer = BufWriter::with_capacity(1024, stream);

        Ok(Socket {
            reader,
            writer,
            remote_ip,
        })
    }

    /// Re-applies the per-request deadlines; reused sockets keep whatever
    /// the previous request configured otherwise.
    pub fn apply_timeouts(
        &self,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> io::Result<()> {
        self.writer.get_ref().set_read_timeout(read_timeout)?;
        self.writer.get_ref().set_write_timeout(write_timeout)
    }

    pub fn remote_ip(&self) -> Option<&str> {
        self.remote_ip.as_deref()
    }
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl BufRead for Socket {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt)
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

fn connect_tcp(host: &str, port: &str, config: &SocketConfig<'_>) -> Result<TcpStream, Error> {
    let port: u16 = port
        .parse()
        .map_err(|_| Error::Argument(format!("invalid port {:?}", port)))?;

    let family = config.family;
    let addrs = (host, port).to_socket_addrs()?.filter(|addr| match family {
        None => true,
        Some(Family::V4) => addr.is_ipv4(),
        Some(Family::V6) => addr.is_ipv6(),
    });

    let mut last_error = None;
    for addr in addrs {
        let attempt = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                debug!("opened connection to {}:{}", host, port);
                return Ok(stream);
            }
            Err(err) => last_error = Some(err),
        }
    }

    let err = last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no usable address for {}:{}", host, port),
        )
    });
    Err(err.into())
}

#[cfg(feature = "ssl-native-tls")]
fn https_stream(mut tcp: TcpStream, config: &SocketConfig<'_>) -> Result<Stream, Error> {
    if let Some(proxy) = config.proxy {
        establish_tunnel(&mut tcp, config.host, config.port, proxy)?;
    }
    let stream = SslStream::connect(tcp, config.host, config.ssl_ca_file, config.ssl_verify_peer)?;
    Ok(Stream::Https(stream))
}

#[cfg(not(feature = "ssl-native-tls"))]
fn https_stream(_tcp: TcpStream, _config: &SocketConfig<'_>) -> Result<Stream, Error> {
    Err(Error::Argument(
        "https destinations need the `ssl` feature".to_string(),
    ))
}

/// Asks the proxy for a raw tunnel to the destination. Runs in the clear,
/// before any TLS handshake; proxy credentials travel here rather than as
/// request headers.
#[cfg_attr(not(feature = "ssl-native-tls"), allow(dead_code))]
fn establish_tunnel<S: Read + Write>(
    stream: &mut S,
    host: &str,
    port: &str,
    proxy: &Proxy,
) -> Result<(), Error> {
    let mut request = format!(
        "CONNECT {}:{} HTTP/1.1\r\nHost: {}:{}\r\n",
        host, port, host, port
    );
    if let Some(user) = &proxy.user {
        let password = proxy.password.as_deref().unwrap_or("");
        request.push_str("Proxy-Authorization: Basic ");
        request.push_str(&crate::options::basic_credentials(user, password));
        request.push_str("\r\n");
    }
    request.push_str("\r\n");

    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    // 12-byte status-line prefix carries the three status digits
    let mut prefix = [0; 12];
    stream.read_exact(&mut prefix)?;
    let status: u16 = std::str::from_utf8(&prefix[9..])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| {
            Error::Socket(io::Error::new(
                io::ErrorKind::InvalidData,
                "malformed proxy status line",
            ))
        })?;

    // drain the rest of the proxy response through the blank line
    let mut window = [0u8; 4];
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte)?;
        window.rotate_left(1);
        window[3] = byte[0];
        if &window == b"\r\n\r\n" {
            break;
        }
    }

    if !(200..300).contains(&status) {
        return Err(Error::ProxyConnect(status));
    }

    Ok(())
}

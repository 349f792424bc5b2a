use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

use std::sync::{Arc, Mutex};

use crate::error::Error;

/// A wrapper around a `native_tls` client stream.
///
/// Uses an internal Mutex so the connection can split the stream into
/// independently owned buffered read and write halves.
#[derive(Clone)]
pub(crate) struct NativeTlsStream(Arc<Mutex<native_tls::TlsStream<TcpStream>>>);

// These methods form the implicit contract for swappable TLS implementations
impl NativeTlsStream {
    /// Performs the client handshake over an established TCP stream. The
    /// server name is verified against `host` unless `verify_peer` is off.
    pub(crate) fn connect(
        tcp: TcpStream,
        host: &str,
        ca_file: Option<&Path>,
        verify_peer: bool,
    ) -> Result<NativeTlsStream, Error> {
        let mut builder = native_tls::TlsConnector::builder();

        if !verify_peer {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }

        if let Some(path) = ca_file {
            let pem = std::fs::read(path)?;
            let certificate = native_tls::Certificate::from_pem(&pem)
                .map_err(|err| Error::Argument(format!("invalid CA file {:?}: {}", path, err)))?;
            builder.add_root_certificate(certificate);
        }

        let connector = builder
            .build()
            .map_err(|err| Error::Socket(io::Error::new(io::ErrorKind::Other, err)))?;

        let stream = connector.connect(host, tcp).map_err(|err| match err {
            native_tls::HandshakeError::WouldBlock(_) => {
                Error::Timeout(io::Error::new(io::ErrorKind::TimedOut, "TLS handshake"))
            }
            native_tls::HandshakeError::Failure(err) => {
                Error::Socket(io::Error::new(io::ErrorKind::Other, err))
            }
        })?;

        Ok(NativeTlsStream(Arc::new(Mutex::new(stream))))
    }

    pub(crate) fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.0
            .lock()
            .expect("Failed to lock SSL stream mutex")
            .get_ref()
            .peer_addr()
    }

    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.0
            .lock()
            .expect("Failed to lock SSL stream mutex")
            .get_ref()
            .set_read_timeout(timeout)
    }

    pub(crate) fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.0
            .lock()
            .expect("Failed to lock SSL stream mutex")
            .get_ref()
            .set_write_timeout(timeout)
    }
}

impl Read for NativeTlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("Failed to lock SSL stream mutex")
            .read(buf)
    }
}

impl Write for NativeTlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .expect("Failed to lock SSL stream mutex")
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0
            .lock()
            .expect("Failed to lock SSL stream mutex")
            .flush()
    }
}

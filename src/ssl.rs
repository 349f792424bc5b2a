//! Modules providing SSL/TLS implementations.
//!
//! In order to keep implementations swappable, these modules adhere to an
//! implicit contract and the enabled one is re-exported as [`SslStream`]:
//! a clonable blocking stream with `peer_addr`, timeout setters, and a
//! `connect(tcp, host, ca_file, verify_peer)` constructor that performs
//! the client handshake.
#[cfg(feature = "ssl-native-tls")]
pub(crate) mod native_tls;
#[cfg(feature = "ssl-native-tls")]
pub(crate) use self::native_tls::NativeTlsStream as SslStream;

//! How the client session engine obtains a transport to a cache.
//!
//! [`Connector`] is the seam that keeps [`super::session`] testable without
//! opening real sockets: production code uses [`TcpConnector`], tests use
//! an in-memory stand-in that scripts the bytes a cache would have sent.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Produces a fresh, connected transport to a single cache.
///
/// Version negotiation and the `CacheReset` escalation both require a new
/// TCP connection per attempt (a cache closes the connection after sending
/// an `ErrorReport`), so the session engine calls [`Connector::connect`]
/// once per attempt rather than reusing a transport across retries.
pub trait Connector {
    type Transport: io::Read + io::Write;

    fn connect(&self, server: &str, port: u16) -> io::Result<Self::Transport>;
}

/// Connects over plain TCP, the default transport for the `tcp` scheme.
#[derive(Clone, Copy, Debug)]
pub struct TcpConnector {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        TcpConnector {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl Connector for TcpConnector {
    type Transport = TcpStream;

    fn connect(&self, server: &str, port: u16) -> io::Result<TcpStream> {
        let addr = (server, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for {}:{}", server, port),
            )
        })?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_write_timeout(Some(self.write_timeout))?;
        Ok(stream)
    }
}

//! Byte-stream transports.
//!
//! Drivers talk to servers through a [`Transport`] opened by a
//! [`Connector`]. [`TcpConnector`] is the default; tests substitute
//! in-memory transports.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// A blocking bidirectional byte stream.
pub trait Transport: Read + Write + Send + fmt::Debug {
    /// Shut the stream down so pending and future reads fail fast.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Opens transports.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Connect to `host:port`.
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> io::Result<Box<dyn Transport>>;
}

/// Plain TCP with `TCP_NODELAY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> io::Result<Box<dyn Transport>> {
        tracing::debug!(host = %host, port, "establishing TCP connection");

        let stream = match timeout {
            None => TcpStream::connect((host, port))?,
            Some(timeout) => {
                let mut last_error = None;
                let mut connected = None;
                for addr in (host, port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(e) => last_error = Some(e),
                    }
                }
                match (connected, last_error) {
                    (Some(stream), _) => stream,
                    (None, Some(e)) => return Err(e),
                    (None, None) => {
                        return Err(io::Error::new(
                            io::ErrorKind::AddrNotAvailable,
                            format!("{host} resolved to no addresses"),
                        ));
                    }
                }
            }
        };

        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_connect_and_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpConnector
            .connect("127.0.0.1", port, Some(Duration::from_secs(5)))
            .unwrap();
        let (mut server, _) = listener.accept().unwrap();

        transport.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        transport.shutdown().unwrap();
        let mut rest = Vec::new();
        assert_eq!(server.read_to_end(&mut rest).unwrap(), 0);
    }

    #[test]
    fn test_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(TcpConnector.connect("127.0.0.1", port, None).is_err());
    }
}

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::{error::Error, internal_prelude::*};

/// A new trait, which can be used to represent plain and TLS encrypted TcpStreams. \
/// This is necessary to write generic functions where both types can be used.
pub trait BlockingStream: Read + Write + Send {
    /// Set the timeout of the underlying socket for subsequent reads.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;

    /// Shut down both halves of the underlying socket.
    fn shutdown(&self) -> std::io::Result<()>;
}

/// Convenience type, so we don't have type write `Box<dyn BlockingStream>` all the time.
pub type GenericBlockingStream = Box<dyn BlockingStream>;

impl BlockingStream for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&self) -> std::io::Result<()> {
        TcpStream::shutdown(self, std::net::Shutdown::Both)
    }
}

/// Open a plain TCP connection to `address:port`.
///
/// All resolved addresses are tried in order.
/// Keepalive is enabled, as console sessions tend to idle for a long time.
pub fn connect_tcp(
    address: &str,
    port: u16,
    connect_timeout: Option<Duration>,
) -> Result<TcpStream, Error> {
    if port == 0 {
        return Err(Error::InvalidSettings("Port must be a positive number".into()));
    }

    let target = format!("{address}:{port}");
    let addresses = (address, port)
        .to_socket_addrs()
        .map_err(|err| Error::Connection(format!("resolving {target}"), err))?;

    let mut last_error = None;
    for socket_address in addresses {
        debug!("Connecting to {socket_address}");
        let result = match connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&socket_address, timeout),
            None => TcpStream::connect(socket_address),
        };

        match result {
            Ok(stream) => {
                enable_keepalive(&stream);
                return Ok(stream);
            }
            Err(err) => {
                debug!("Failed to connect to {socket_address}: {err}");
                last_error = Some(err);
            }
        }
    }

    let err = last_error.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{target} didn't resolve to any address"),
        )
    });
    Err(Error::Connection(format!("connecting to {target}"), err))
}

#[cfg(unix)]
fn enable_keepalive(stream: &TcpStream) {
    use nix::sys::socket::{setsockopt, sockopt::KeepAlive};

    if let Err(err) = setsockopt(stream, KeepAlive, &true) {
        warn!("Failed to enable TCP keepalive: {err}");
    }
}

#[cfg(not(unix))]
fn enable_keepalive(_stream: &TcpStream) {}

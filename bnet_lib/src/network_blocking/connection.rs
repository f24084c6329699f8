use std::time::Duration;

use super::{
    protocol::{self, Frame},
    socket::{GenericBlockingStream, connect_tcp},
    tls::{self, TlsPskOptions},
};
use crate::{error::Error, frame::Header, internal_prelude::*, signal::Signal};

/// How the connection should treat TLS-PSK.
#[derive(Clone, Debug)]
pub struct TlsPolicy {
    /// The PSK parameters. `None` disables TLS-PSK.
    pub psk: Option<TlsPskOptions>,
    /// Fail instead of falling back to a plain connection.
    pub require: bool,
}

/// A single connection to a Bareos daemon.
///
/// Once a socket error has been seen or the stream lost its frame boundaries, the stream
/// is dropped and all further operations fail with [Error::NotConnected].
pub struct Connection {
    stream: Option<GenericBlockingStream>,
    address: String,
    port: u16,
    tls: bool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl Connection {
    /// Connect via TCP and, depending on the policy, upgrade to TLS-PSK.
    ///
    /// If the TLS-PSK handshake fails and TLS isn't required, a new plain TCP connection
    /// is opened. The old one can't be reused, as the peer has already seen our ClientHello.
    pub fn open(
        address: &str,
        port: u16,
        tls_policy: &TlsPolicy,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let psk = match &tls_policy.psk {
            Some(psk) if tls::is_supported() => psk,
            psk => {
                if tls_policy.require {
                    let reason = if psk.is_some() {
                        "bnet-lib has been built without the `tls_psk` feature"
                    } else {
                        "TLS-PSK is disabled for this connection"
                    };
                    return Err(Error::Tls(format!("TLS-PSK is required, but {reason}")));
                }
                let tcp_stream = connect_tcp(address, port, connect_timeout)?;
                return Ok(Self::from_stream(Box::new(tcp_stream), address, port, false));
            }
        };

        let tcp_stream = connect_tcp(address, port, connect_timeout)?;
        match tls::upgrade(tcp_stream, psk) {
            Ok(tls_stream) => Ok(Self::from_stream(Box::new(tls_stream), address, port, true)),
            Err(err) if tls_policy.require => Err(err),
            Err(err) => {
                warn!("TLS-PSK connection failed, falling back to a plain connection: {err}");
                let tcp_stream = connect_tcp(address, port, connect_timeout)?;
                Ok(Self::from_stream(Box::new(tcp_stream), address, port, false))
            }
        }
    }

    /// Wrap an already established stream.
    pub fn from_stream(
        stream: GenericBlockingStream,
        address: &str,
        port: u16,
        tls: bool,
    ) -> Self {
        Connection {
            stream: Some(stream),
            address: address.to_string(),
            port,
            tls,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether the connection is TLS-PSK encrypted.
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn stream(&mut self) -> Result<&mut GenericBlockingStream, Error> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }

    /// Drop the stream if the error means that it's unusable.
    /// The socket is discarded, not shut down, as it's already broken.
    fn check<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(err) = &result {
            if err.is_connection_error() {
                self.drop_stream();
            }
        }
        result
    }

    /// Drop the stream after any error that left it in the middle of a frame.
    /// The next read would interpret payload bytes as a header.
    fn check_framing<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if result.is_err() {
            self.drop_stream();
        }
        result
    }

    fn drop_stream(&mut self) {
        if self.stream.take().is_some() {
            debug!("Marking connection to {}:{} as dead", self.address, self.port);
        }
    }

    /// Send the payload as a single frame.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), Error> {
        let result = protocol::send_bytes(payload, self.stream()?);
        // Any failed write leaves the stream in an unknown state.
        self.check_framing(result)
    }

    pub fn send_signal(&mut self, signal: Signal) -> Result<(), Error> {
        let result = protocol::send_signal(signal, self.stream()?);
        self.check_framing(result)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        let result = self
            .stream()?
            .set_read_timeout(timeout)
            .map_err(|err| Error::Connection("setting read timeout".into(), err));
        self.check(result)
    }

    /// Receive exactly `length` bytes of a payload, whose header has already been read.
    /// Any error, including a timeout, drops the connection.
    pub fn recv_bytes(
        &mut self,
        length: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, Error> {
        self.set_read_timeout(timeout)?;
        let result = protocol::receive_bytes(self.stream()?, length);
        self.check_framing(result)
    }

    /// Receive the next frame header.
    ///
    /// A timeout before the first byte of the header leaves the connection intact.
    /// A header that announces an oversized frame drops it, as its payload can't be skipped.
    pub fn recv_header(&mut self, timeout: Option<Duration>) -> Result<Header, Error> {
        self.set_read_timeout(timeout)?;
        match protocol::receive_header(self.stream()?) {
            Err(Error::Timeout(reason)) => Err(Error::Timeout(reason)),
            result => self.check_framing(result),
        }
    }

    /// Receive the next frame.
    pub fn recv_frame(&mut self, timeout: Option<Duration>) -> Result<Frame, Error> {
        match self.recv_header(timeout)? {
            Header::Signal(code) => Ok(Frame::Signal(code)),
            Header::Payload(length) => self.recv_bytes(length, timeout).map(Frame::Payload),
        }
    }

    /// Receive a frame that must carry payload.
    /// Signals are reported as [Error::SignalReceived].
    pub fn recv_message(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>, Error> {
        match self.recv_frame(timeout)? {
            Frame::Payload(payload) => Ok(payload),
            Frame::Signal(code) => match Signal::from_code(code) {
                Some(signal) => Err(Error::SignalReceived(signal)),
                None => Err(Error::Protocol(format!(
                    "Received unknown signal {code} while expecting data"
                ))),
            },
        }
    }

    /// Close the connection. Calling this multiple times is fine.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Closing connection to {}:{}", self.address, self.port);
            if let Err(err) = stream.shutdown() {
                trace!("Error while shutting down socket: {err}");
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

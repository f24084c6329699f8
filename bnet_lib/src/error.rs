//! bnet-lib errors.
use std::path::PathBuf;

use crate::signal::Signal;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The TCP or TLS connection couldn't be established or broke while sending.
    #[error("Connection error while {0}:\n{1}")]
    Connection(String, std::io::Error),

    /// The TLS-PSK handshake failed. This is a connection error as well.
    #[error("TLS-PSK error: {0}")]
    Tls(String),

    /// The peer went away in the middle of a message.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A read of a frame header returned zero bytes. The peer closed the connection.
    #[error("Received an empty header. The peer closed the connection.")]
    SocketEmptyHeader,

    /// A read ran into the socket's read timeout.
    /// This is surfaced as-is, callers decide whether it's fatal.
    #[error("Timeout while {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The secondary PAM exchange was rejected or is misconfigured.
    /// This is a special kind of [Error::Authentication].
    #[error("PAM authentication failed: {0}")]
    PamAuthentication(String),

    /// A signal arrived where only payload was expected.
    #[error("Received signal {0} ({code}) while expecting data", code = .0.code())]
    SignalReceived(Signal),

    /// The peer sent something that doesn't match the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The session has no live connection.
    #[error("Not connected")]
    NotConnected,

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Error while reading configuration:\n{0}")]
    ConfigDeserialization(String),

    #[error("Error while building path: {0}")]
    InvalidPath(String),

    #[error("Some error occurred. {0}")]
    Generic(String),

    #[error("I/O error at path {0:?} while {1}:\n{2}")]
    IoPathError(PathBuf, &'static str, std::io::Error),
}

impl Error {
    /// Whether the credential exchange has been rejected.
    /// PAM failures count as authentication errors as well.
    pub fn is_authentication_error(&self) -> bool {
        matches!(self, Error::Authentication(_) | Error::PamAuthentication(_))
    }

    /// Whether this error means that the connection is gone or couldn't be established.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(..)
                | Error::Tls(_)
                | Error::ConnectionLost(_)
                | Error::SocketEmptyHeader
                | Error::NotConnected
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pam_errors_are_authentication_errors() {
        assert!(Error::PamAuthentication("denied".into()).is_authentication_error());
        assert!(Error::Authentication("denied".into()).is_authentication_error());
        assert!(!Error::SocketEmptyHeader.is_authentication_error());
    }

    #[test]
    fn connection_errors() {
        assert!(Error::Tls("handshake failed".into()).is_connection_error());
        assert!(Error::SocketEmptyHeader.is_connection_error());
        assert!(!Error::Protocol("oversized frame".into()).is_connection_error());
        assert!(!Error::Authentication("denied".into()).is_connection_error());
    }

    #[test]
    fn signal_error_message() {
        let error = Error::SignalReceived(Signal::Terminate);
        assert_eq!(
            error.to_string(),
            "Received signal terminate (-4) while expecting data"
        );
    }
}

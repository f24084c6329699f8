//! This module contains everything that's necessary to exchange frames with a Bareos daemon.
//!
//! ## Sockets
//!
//! Communication happens via TCP. Directors and file daemons from 18.2 onwards additionally
//! accept TLS-PSK, which is negotiated right after the TCP connect and before any BNET frame
//! is exchanged. The pre-shared key is derived from the password, so no certificates are involved.
//!
//! ## Communication
//!
//! Sending and receiving raw frames is handled by the [protocol] module.
//! Each frame consists of a 4 byte header and an optional payload. See [crate::frame] for details.
//!
//! [Connection] bundles a stream with that logic and takes care of translating socket errors
//! into this crate's [Error](crate::Error) type.
//! Once a socket error has been seen, the connection is considered dead and its stream is dropped.

pub mod connection;
pub mod protocol;
pub mod socket;
pub mod tls;

pub use connection::Connection;
pub use socket::{BlockingStream, GenericBlockingStream};
pub use tls::{TlsPskOptions, TlsVersion};

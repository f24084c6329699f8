//! TLS-PSK support.
//!
//! Bareos doesn't use certificates for console connections by default.
//! Both sides derive a pre-shared key from the password instead and use
//! `<identity prefix><RS><name>` as the PSK identity.
//!
//! The actual handshake needs OpenSSL and is only compiled in with the `tls_psk` feature.
#[cfg(not(feature = "tls_psk"))]
use std::net::TcpStream;

use serde::{Deserialize, Serialize};

#[cfg(not(feature = "tls_psk"))]
use crate::error::Error;

/// Everything but NULL, export, anonymous and MD5 based ciphers.
pub const CIPHER_LIST: &str = "ALL:!aNULL:!eNULL:!EXPORT:!MD5:!DES:!RC4";

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub enum TlsVersion {
    #[default]
    #[serde(rename = "tls1_2")]
    Tls1_2,
    #[serde(rename = "tls1_3")]
    Tls1_3,
}

/// The parameters for a TLS-PSK handshake.
#[derive(Clone)]
pub struct TlsPskOptions {
    pub identity: Vec<u8>,
    pub secret: Vec<u8>,
    pub version: TlsVersion,
}

impl std::fmt::Debug for TlsPskOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsPskOptions")
            .field("identity", &String::from_utf8_lossy(&self.identity))
            .field("secret", &"<redacted>")
            .field("version", &self.version)
            .finish()
    }
}

/// Whether this build is able to do TLS-PSK at all.
pub fn is_supported() -> bool {
    cfg!(feature = "tls_psk")
}

#[cfg(feature = "tls_psk")]
pub use self::openssl_psk::upgrade;

#[cfg(feature = "tls_psk")]
mod openssl_psk {
    use std::net::TcpStream;

    use openssl::error::ErrorStack;
    use openssl::ssl::{SslConnector, SslMethod, SslStream, SslVerifyMode, SslVersion};

    use super::{TlsPskOptions, TlsVersion, CIPHER_LIST};
    use crate::{error::Error, internal_prelude::*, network_blocking::BlockingStream};

    impl BlockingStream for SslStream<TcpStream> {
        fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> std::io::Result<()> {
            self.get_ref().set_read_timeout(timeout)
        }

        fn shutdown(&self) -> std::io::Result<()> {
            self.get_ref().shutdown(std::net::Shutdown::Both)
        }
    }

    fn tls_error(context: &str, err: ErrorStack) -> Error {
        Error::Tls(format!("{context}: {err}"))
    }

    /// Run the TLS-PSK handshake on top of an established TCP connection.
    pub fn upgrade(
        stream: TcpStream,
        options: &TlsPskOptions,
    ) -> Result<SslStream<TcpStream>, Error> {
        let version = match options.version {
            TlsVersion::Tls1_2 => SslVersion::TLS1_2,
            TlsVersion::Tls1_3 => SslVersion::TLS1_3,
        };

        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|err| tls_error("creating connector", err))?;
        builder
            .set_min_proto_version(Some(version))
            .map_err(|err| tls_error("setting minimum TLS version", err))?;
        builder
            .set_max_proto_version(Some(version))
            .map_err(|err| tls_error("setting maximum TLS version", err))?;
        builder
            .set_cipher_list(CIPHER_LIST)
            .map_err(|err| tls_error("setting cipher list", err))?;
        // The PSK authenticates both sides, there's no certificate to check.
        builder.set_verify(SslVerifyMode::NONE);

        let identity = options.identity.clone();
        let secret = options.secret.clone();
        builder.set_psk_client_callback(move |_ssl, _hint, identity_buffer, psk_buffer| {
            // OpenSSL expects a NUL terminated identity.
            if identity.len() >= identity_buffer.len() || secret.len() > psk_buffer.len() {
                return Err(ErrorStack::get());
            }
            identity_buffer[..identity.len()].copy_from_slice(&identity);
            identity_buffer[identity.len()] = 0;
            psk_buffer[..secret.len()].copy_from_slice(&secret);

            Ok(secret.len())
        });

        let connector = builder.build();
        let configuration = connector
            .configure()
            .map_err(|err| tls_error("configuring connection", err))?
            .use_server_name_indication(false)
            .verify_hostname(false);

        debug!("Starting TLS-PSK handshake");
        let stream = configuration
            .connect("", stream)
            .map_err(|err| Error::Tls(format!("handshake failed: {err}")))?;
        debug!(
            "TLS-PSK established: {} {}",
            stream.ssl().version_str(),
            stream
                .ssl()
                .current_cipher()
                .map_or("unknown cipher", |cipher| cipher.name())
        );

        Ok(stream)
    }
}

/// Without the `tls_psk` feature every upgrade fails.
#[cfg(not(feature = "tls_psk"))]
pub fn upgrade(_stream: TcpStream, _options: &TlsPskOptions) -> Result<TcpStream, Error> {
    Err(Error::Tls(
        "bnet-lib has been built without TLS-PSK support (feature `tls_psk`)".into(),
    ))
}

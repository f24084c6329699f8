//! A complete, authenticated session with a Bareos daemon.
//!
//! [Session] glues together the [Connection], the [authentication handshake](crate::auth)
//! and the [response reassembly](crate::response).
//! The differences between director consoles and file daemon connections are
//! captured in the [SessionConfig], mainly via [ConnectionRole].
//!
//! A session isn't meant to be shared between threads. Only a single command may be in flight
//! at any time, so each [Session::call] waits for the complete response.
use std::time::Duration;

use tracing::Span;

use crate::{
    auth::{self, Handshake, PamCredentials},
    credential::Credential,
    error::Error,
    frame::Header,
    internal_prelude::*,
    message::{ConnectionRole, ProtocolVersion, tls_psk_identity},
    network_blocking::{
        Connection,
        connection::TlsPolicy,
        tls::{TlsPskOptions, TlsVersion},
    },
    response::{ResponseBuffer, Terminator},
    signal::{Signal, describe},
};

/// The name consoles use if no named console is configured.
pub const DEFAULT_CONSOLE_NAME: &str = "*UserAgent*";

/// The command that switches a director console into JSON API mode.
pub const JSON_INIT_COMMAND: &str = ".api 2 compact=yes";

/// The command that keeps the director from interleaving messages with command output.
pub const CONSOLE_INIT_COMMAND: &str = "autodisplay off";

/// Everything needed to establish a [Session].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub address: String,
    pub port: u16,
    /// Our name, used in the hello message and the TLS-PSK identity.
    pub name: String,
    /// The name of the daemon we connect to. Only used for logging.
    pub dirname: Option<String>,
    pub role: ConnectionRole,
    pub credential: Credential,
    /// Pin the protocol version. This disables the fallback to the legacy protocol.
    pub protocol_version: Option<ProtocolVersion>,
    pub tls_psk_enable: bool,
    pub tls_psk_require: bool,
    pub tls_version: TlsVersion,
    pub pam: Option<PamCredentials>,
    /// How often [Session::reconnect] may be used over the lifetime of the session.
    pub max_reconnects: u32,
    /// Timeout for each frame header read while waiting for a response.
    pub header_timeout: Duration,
    pub connect_timeout: Option<Duration>,
    /// The command that's executed right after authentication.
    pub init_command: Option<String>,
    /// The default terminator for [Session::call].
    pub terminator: Terminator,
}

impl SessionConfig {
    /// A plain console connection to a director.
    pub fn director(address: impl Into<String>, port: u16, credential: Credential) -> Self {
        SessionConfig {
            address: address.into(),
            port,
            name: DEFAULT_CONSOLE_NAME.to_string(),
            dirname: None,
            role: ConnectionRole::Director,
            credential,
            protocol_version: None,
            tls_psk_enable: true,
            tls_psk_require: false,
            tls_version: TlsVersion::default(),
            pam: None,
            max_reconnects: 0,
            header_timeout: Duration::from_secs(10),
            connect_timeout: None,
            init_command: Some(CONSOLE_INIT_COMMAND.to_string()),
            terminator: Terminator::console(),
        }
    }

    /// A connection to a file daemon, pretending to be the director `director_name`.
    pub fn file_daemon(
        address: impl Into<String>,
        port: u16,
        credential: Credential,
        director_name: impl Into<String>,
    ) -> Self {
        SessionConfig {
            name: director_name.into(),
            role: ConnectionRole::FileDaemon,
            init_command: None,
            ..Self::director(address, port, credential)
        }
    }

    /// Switch a director console into JSON API mode.
    pub fn json(mut self) -> Self {
        if self.role == ConnectionRole::Director {
            self.init_command = Some(JSON_INIT_COMMAND.to_string());
            self.terminator = Terminator::json();
        }
        self
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> Result<(), Error> {
        if self.port == 0 {
            return Err(Error::InvalidSettings(
                "The port must be a positive number".into(),
            ));
        }
        if self.name.is_empty() {
            return Err(Error::InvalidSettings("The name must not be empty".into()));
        }
        if self.tls_psk_require && !self.tls_psk_enable {
            return Err(Error::InvalidSettings(
                "TLS-PSK can't be required while it's disabled".into(),
            ));
        }
        if self.pam.is_some() && self.role == ConnectionRole::FileDaemon {
            return Err(Error::InvalidSettings(
                "PAM is only available for director consoles".into(),
            ));
        }
        // Sockets refuse a zero timeout.
        if self.header_timeout.is_zero() || self.connect_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidSettings("Timeouts must not be zero".into()));
        }
        Ok(())
    }

    fn tls_policy(&self, version: ProtocolVersion) -> TlsPolicy {
        // Daemons before 18.2 don't know about TLS-PSK.
        let usable = self.tls_psk_enable && version >= ProtocolVersion::Bareos182;

        TlsPolicy {
            psk: usable.then(|| TlsPskOptions {
                identity: tls_psk_identity(self.role.identity_prefix(), &self.name),
                secret: self.credential.key(),
                version: self.tls_version,
            }),
            require: self.tls_psk_require,
        }
    }
}

/// An authenticated connection to a Bareos daemon.
pub struct Session {
    config: SessionConfig,
    connection: Option<Connection>,
    protocol_version: ProtocolVersion,
    /// The current connection completed the handshake.
    authenticated: bool,
    /// Any connection of this session completed the handshake at some point.
    /// Only then reconnecting makes sense.
    credentials_valid: bool,
    reconnects_left: u32,
    /// The last signal that has been received.
    status: Option<i32>,
    /// The peer's last status line of the handshake.
    peer_info: Option<String>,
    buffer: ResponseBuffer,
    span: Span,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.config.address)
            .field("port", &self.config.port)
            .field("role", &self.config.role)
            .field("protocol_version", &self.protocol_version)
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

impl Session {
    /// Create a session without connecting yet.
    pub fn new(config: SessionConfig) -> Result<Self, Error> {
        config.validate()?;

        let span = info_span!(
            "bnet",
            role = %config.role,
            address = %config.address,
            port = config.port,
            name = %config.name,
        );

        Ok(Session {
            protocol_version: config.protocol_version.unwrap_or(ProtocolVersion::LATEST),
            reconnects_left: config.max_reconnects,
            config,
            connection: None,
            authenticated: false,
            credentials_valid: false,
            status: None,
            peer_info: None,
            buffer: ResponseBuffer::new(),
            span,
        })
    }

    /// Connect and authenticate.
    pub fn connect(config: SessionConfig) -> Result<Self, Error> {
        let mut session = Session::new(config)?;
        session.open()?;
        Ok(session)
    }

    /// Establish the connection, including the fallback to the legacy protocol.
    ///
    /// Directors older than 18.2 reject the newer hello. If the version hasn't been pinned,
    /// the complete handshake is repeated once on a fresh connection with the legacy protocol.
    pub fn open(&mut self) -> Result<(), Error> {
        let span = self.span.clone();
        let _guard = span.enter();

        let version = self.config.protocol_version.unwrap_or(ProtocolVersion::LATEST);
        match self.establish(version) {
            Err(Error::Authentication(reason))
                if self.config.protocol_version.is_none()
                    && self.config.role == ConnectionRole::Director
                    && version > ProtocolVersion::LEGACY =>
            {
                warn!(
                    "Authentication with protocol {version} failed ({reason}). \
                    Retrying with protocol {}.",
                    ProtocolVersion::LEGACY
                );
                self.establish(ProtocolVersion::LEGACY)
            }
            result => result,
        }
    }

    /// Connect, authenticate and initialize with exactly one protocol version.
    fn establish(&mut self, version: ProtocolVersion) -> Result<(), Error> {
        self.close();
        self.protocol_version = version;

        let mut connection = Connection::open(
            &self.config.address,
            self.config.port,
            &self.config.tls_policy(version),
            self.config.connect_timeout,
        )?;

        let handshake = Handshake {
            name: &self.config.name,
            role: self.config.role,
            version,
            credential: &self.config.credential,
            pam: self.config.pam.as_ref(),
            timeout: Some(self.config.header_timeout),
        };
        let peer_info = auth::authenticate(&mut connection, &handshake)?;
        info!(
            "Authenticated with {}: {peer_info}",
            self.config.dirname.as_deref().unwrap_or(&self.config.address)
        );

        self.connection = Some(connection);
        self.peer_info = Some(peer_info);
        self.authenticated = true;
        self.credentials_valid = true;

        if let Some(command) = self.config.init_command.clone() {
            debug!("Initializing session with '{command}'");
            self.call(command)?;
        }

        Ok(())
    }

    /// Send a command and return the complete response, using the configured terminator.
    pub fn call(&mut self, command: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
        let terminator = self.config.terminator.clone();
        self.call_until(command, &terminator)
    }

    /// Send a command given as separate words.
    pub fn call_args<I, S>(&mut self, args: I) -> Result<Vec<u8>, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let command = args
            .into_iter()
            .map(|arg| arg.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.call(command)
    }

    /// Send a command and return the response, which ends either with a signal
    /// (end of data, terminate, main prompt, sub prompt) or with the first match of `terminator`.
    ///
    /// Data received after the terminator's match is kept for the next call.
    /// Timeouts while waiting for the next frame header are logged and ignored.
    pub fn call_until(
        &mut self,
        command: impl AsRef<[u8]>,
        terminator: &Terminator,
    ) -> Result<Vec<u8>, Error> {
        let span = self.span.clone();
        let _guard = span.enter();

        let Some(connection) = self.connection.as_mut() else {
            return Err(Error::NotConnected);
        };
        debug!("Sending command: {}", String::from_utf8_lossy(command.as_ref()));

        let result = exchange(
            connection,
            &mut self.buffer,
            &mut self.status,
            command.as_ref(),
            terminator,
            self.config.header_timeout,
        );

        let alive = connection.is_connected();
        if let Err(err) = &result {
            error!("Command failed: {err}");
            if !alive || err.is_connection_error() {
                self.mark_dead();
            }
        }
        result
    }

    /// Like [Session::call], but if the connection is lost, [Session::reconnect] is tried and
    /// the command is repeated once.
    pub fn call_with_reconnect(&mut self, command: impl AsRef<[u8]>) -> Result<Vec<u8>, Error> {
        match self.call(command.as_ref()) {
            Err(err) if err.is_connection_error() || !self.is_connected() => {
                warn!("Connection problem ({err}), trying to reconnect.");
                if self.reconnect() {
                    self.call(command)
                } else {
                    Err(err)
                }
            }
            result => result,
        }
    }

    /// Try to establish a new connection with the negotiated protocol version.
    ///
    /// This only works if the session has been authenticated before and reconnects are left.
    /// Failures are logged and reported as `false`.
    pub fn reconnect(&mut self) -> bool {
        let span = self.span.clone();
        let _guard = span.enter();

        if !self.credentials_valid {
            debug!("Not reconnecting, the session has never been authenticated.");
            return false;
        }
        if self.reconnects_left == 0 {
            warn!("Not reconnecting, no reconnects left.");
            return false;
        }
        self.reconnects_left -= 1;

        info!(
            "Reconnecting ({} reconnects left afterwards)",
            self.reconnects_left
        );
        match self.establish(self.protocol_version) {
            Ok(()) => true,
            Err(err) => {
                warn!("Reconnect failed: {err}");
                self.close();
                false
            }
        }
    }

    /// Drop a broken connection without trying to shut it down.
    fn mark_dead(&mut self) {
        self.connection = None;
        self.authenticated = false;
        self.buffer.clear();
    }

    /// Close the connection. Calling this on a closed session is fine.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if connection.is_connected() {
                // Tell the peer we're leaving. It doesn't matter if that fails.
                let _ = connection.send_signal(Signal::Terminate);
            }
            connection.close();
        }
        self.authenticated = false;
        self.buffer.clear();
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.is_connected())
    }

    /// The protocol version that's currently in use.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// The last signal received from the peer.
    pub fn status(&self) -> Option<Signal> {
        self.status.and_then(Signal::from_code)
    }

    /// The final status line the peer sent during authentication.
    pub fn peer_info(&self) -> Option<&str> {
        self.peer_info.as_deref()
    }

    pub fn reconnects_left(&self) -> u32 {
        self.reconnects_left
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the current connection is TLS-PSK encrypted.
    pub fn is_tls(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.is_tls())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Send a command and read frames until the response is complete.
fn exchange(
    connection: &mut Connection,
    buffer: &mut ResponseBuffer,
    status: &mut Option<i32>,
    command: &[u8],
    terminator: &Terminator,
    header_timeout: Duration,
) -> Result<Vec<u8>, Error> {
    connection.send(command)?;

    loop {
        let header = match connection.recv_header(Some(header_timeout)) {
            Ok(header) => header,
            Err(Error::Timeout(_)) => {
                debug!("Still waiting for a response after {header_timeout:?}");
                continue;
            }
            Err(err) => return Err(err),
        };

        match header {
            Header::Signal(code) => {
                *status = Some(code);
                debug!("Received signal: {}", describe(code));
                if Signal::from_code(code).is_some_and(Signal::ends_response) {
                    return Ok(buffer.take());
                }
            }
            Header::Payload(length) => {
                let payload = connection.recv_bytes(length, None)?;
                if let Some(response) = buffer.push(&payload, terminator) {
                    trace!("Response complete, {} bytes pending", buffer.pending().len());
                    return Ok(response);
                }
            }
        }
    }
}

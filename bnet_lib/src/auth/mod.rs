//! The authentication handshake.
//!
//! The following steps are written from our, the connecting side's, perspective:
//!
//! - Send the hello message.
//! - Receive the peer's CRAM-MD5 challenge, answer it and receive the peer's verdict.
//! - Send our own challenge, verify the peer's answer and send our verdict.
//! - Directors may now ask for PAM credentials.
//! - Receive the final status line(s).
//!
//! Both sides prove that they know the password, without ever sending it.
use std::time::Duration;

use hmac::{Hmac, Mac};
use md5::Md5;
use rand::Rng;

use crate::{
    credential::Credential,
    error::Error,
    internal_prelude::*,
    message::{
        self, ConnectionRole, ProtocolVersion, StatusLine, id, parse_challenge,
        parse_status_line, strip_terminator,
    },
    network_blocking::Connection,
};

pub mod encoding;

/// We never ask for in-band TLS. If TLS-PSK is used, it's already active at this point.
const TLS_LOCAL_NEED: u8 = 0;

/// A PAM username and password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct PamCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for PamCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PamCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything the handshake needs to know.
#[derive(Debug)]
pub struct Handshake<'a> {
    pub name: &'a str,
    pub role: ConnectionRole,
    pub version: ProtocolVersion,
    pub credential: &'a Credential,
    pub pam: Option<&'a PamCredentials>,
    /// The timeout for each single read during the handshake.
    pub timeout: Option<Duration>,
}

/// Run the complete handshake.
///
/// Returns the last status line the peer sent, which usually contains its name and version.
pub fn authenticate(connection: &mut Connection, handshake: &Handshake) -> Result<String, Error> {
    debug!(
        "Authenticating as {} with protocol {}",
        handshake.name, handshake.version
    );
    connection.send(&message::hello(
        handshake.name,
        handshake.role,
        handshake.version,
    ))?;

    respond_to_challenge(connection, handshake.credential, handshake.timeout)?;
    issue_challenge(
        connection,
        handshake.name,
        handshake.credential,
        handshake.timeout,
    )?;

    match handshake.role {
        ConnectionRole::Director => finalize_director(connection, handshake),
        ConnectionRole::FileDaemon => finalize_file_daemon(connection, handshake),
    }
}

/// HMAC-MD5 over `message`, keyed with the credential's hex digest.
pub fn hmac_md5(key: &[u8], message: &[u8]) -> [u8; 16] {
    let mut mac = <Hmac<Md5> as Mac>::new_from_slice(key).expect("HMAC accepts keys of any size");
    mac.update(message);

    let mut digest = [0; 16];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    digest
}

/// Check the peer's answer to our challenge.
/// Both base64 flavours are accepted, see [encoding].
pub fn verify_response(credential: &Credential, token: &[u8], response: &[u8]) -> bool {
    let digest = hmac_md5(&credential.key(), token);

    response == encoding::compatible(&digest).as_bytes()
        || response == encoding::legacy(&digest).as_bytes()
}

/// A fresh challenge token: `<RANDOM.UNIXTIME@NAME>`.
pub fn challenge_token(name: &str) -> String {
    let random: u64 = rand::rng().random_range(1_000_000_000..=9_999_999_999);
    let time = chrono::Utc::now().timestamp();
    format!("<{random}.{time}@{name}>")
}

/// Receive a line during the handshake. Signals are an error here.
fn receive_line(connection: &mut Connection, timeout: Option<Duration>) -> Result<Vec<u8>, Error> {
    let message = connection.recv_message(timeout)?;
    trace!("Received: {:?}", String::from_utf8_lossy(&message));
    Ok(message)
}

fn receive_status(
    connection: &mut Connection,
    timeout: Option<Duration>,
) -> Result<StatusLine, Error> {
    let line = receive_line(connection, timeout)?;
    parse_status_line(&line).ok_or_else(|| {
        Error::Protocol(format!(
            "Expected a status line, got {:?}",
            String::from_utf8_lossy(strip_terminator(&line))
        ))
    })
}

/// Prove to the peer that we know the password.
fn respond_to_challenge(
    connection: &mut Connection,
    credential: &Credential,
    timeout: Option<Duration>,
) -> Result<(), Error> {
    let line = receive_line(connection, timeout)?;
    let challenge = parse_challenge(&line).ok_or_else(|| {
        Error::Authentication(format!(
            "Expected a CRAM-MD5 challenge, got {:?}",
            String::from_utf8_lossy(strip_terminator(&line))
        ))
    })?;

    debug!(
        "Received challenge (compatible: {}, ssl={})",
        challenge.compatible, challenge.tls_need
    );
    if challenge.tls_need == 2 && !connection.is_tls() {
        warn!("The peer requires TLS, but the connection isn't encrypted.");
    }

    let digest = hmac_md5(&credential.key(), &challenge.token);
    let response = if challenge.compatible {
        encoding::compatible(&digest)
    } else {
        encoding::legacy(&digest)
    };
    connection.send(response.as_bytes())?;

    let verdict = receive_line(connection, timeout)?;
    if !message::is_auth_ok(&verdict) {
        return Err(Error::Authentication(format!(
            "The peer rejected our credentials: {}",
            String::from_utf8_lossy(strip_terminator(&verdict))
        )));
    }

    Ok(())
}

/// Make the peer prove that it knows the password as well.
fn issue_challenge(
    connection: &mut Connection,
    name: &str,
    credential: &Credential,
    timeout: Option<Duration>,
) -> Result<(), Error> {
    let token = challenge_token(name);
    connection.send(&message::challenge(&token, TLS_LOCAL_NEED))?;

    let response = receive_line(connection, timeout)?;
    if verify_response(credential, token.as_bytes(), strip_terminator(&response)) {
        connection.send(&message::auth_ok())?;
        Ok(())
    } else {
        if let Err(err) = connection.send(&message::auth_failed()) {
            debug!("Couldn't tell the peer about the failed challenge: {err}");
        }
        Err(Error::Authentication(
            "The peer failed our challenge. It doesn't know the password.".into(),
        ))
    }
}

fn finalize_director(
    connection: &mut Connection,
    handshake: &Handshake,
) -> Result<String, Error> {
    let mut status = receive_status(connection, handshake.timeout)?;

    let pam_used = status.code == id::PAM_REQUIRED;
    if pam_used {
        debug!("PAM request: {}", status.text);
        let Some(pam) = handshake.pam else {
            return Err(Error::PamAuthentication(
                "PAM authentication is requested, but no PAM credentials were given.".into(),
            ));
        };
        connection.send(&message::pam_user_credentials(&pam.username, &pam.password))?;

        status = match receive_status(connection, handshake.timeout) {
            Ok(status) => status,
            Err(err) if err.is_connection_error() => {
                return Err(Error::PamAuthentication(format!(
                    "The director closed the connection: {err}"
                )))
            }
            Err(err) => return Err(err),
        };
    } else if handshake.pam.is_some() {
        return Err(Error::PamAuthentication(
            "PAM credentials were given, but the director console doesn't offer PAM login.".into(),
        ));
    }

    if status.code != id::OK {
        let text = format!(
            "Received {} {} while expecting auth ok",
            status.code, status.text
        );
        return Err(if pam_used {
            Error::PamAuthentication(text)
        } else {
            Error::Authentication(text)
        });
    }
    debug!("OK: {}", status.text);

    if handshake.version < ProtocolVersion::Bareos182 {
        return Ok(status.text);
    }

    let info = receive_status(connection, handshake.timeout)?;
    if info.code != id::INFO_MESSAGE {
        return Err(Error::Authentication(format!(
            "Received {} {} while expecting the info message",
            info.code, info.text
        )));
    }
    debug!("Info message: {}", info.text);

    Ok(info.text)
}

fn finalize_file_daemon(
    connection: &mut Connection,
    handshake: &Handshake,
) -> Result<String, Error> {
    if handshake.pam.is_some() {
        return Err(Error::PamAuthentication(
            "File daemons don't offer PAM login.".into(),
        ));
    }

    let status = receive_status(connection, handshake.timeout)?;
    if status.code != id::FD_OK {
        return Err(Error::Authentication(format!(
            "Received {} {} while expecting the file daemon's OK",
            status.code, status.text
        )));
    }
    debug!("OK: {}", status.text);

    Ok(status.text)
}

//! The literal messages exchanged during connection setup.
//!
//! Everything in here is pure. The functions only build or parse byte sequences,
//! the actual I/O happens in [crate::auth] and [crate::session].
use std::sync::LazyLock;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// ASCII record separator, used to separate fields in a few protocol messages.
pub const RECORD_SEPARATOR: u8 = 0x1e;

/// The version this client announces to directors with protocol >= 18.2.
pub const CLIENT_VERSION: &str = "18.2.5";

/// Numeric message ids at the start of status lines.
pub mod id {
    pub const OK: u32 = 1000;
    pub const PAM_REQUIRED: u32 = 1001;
    pub const INFO_MESSAGE: u32 = 1002;
    pub const FD_OK: u32 = 2000;
    pub const PAM_USER_CREDENTIALS: u32 = 4002;
}

/// The BNET protocol versions this client can speak.
#[derive(
    PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Display, EnumString, Deserialize, Serialize,
)]
pub enum ProtocolVersion {
    /// The legacy baseline, spoken by all Bareos versions.
    #[serde(rename = "bareos_12_4")]
    #[strum(serialize = "bareos_12_4")]
    Bareos124 = 1,
    /// Adds the client version to the hello, TLS-PSK, PAM and the post-auth info line.
    #[serde(rename = "bareos_18_2")]
    #[strum(serialize = "bareos_18_2")]
    Bareos182 = 2,
}

impl ProtocolVersion {
    pub const LEGACY: ProtocolVersion = ProtocolVersion::Bareos124;
    pub const LATEST: ProtocolVersion = ProtocolVersion::Bareos182;
}

/// Which kind of daemon we're talking to.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionRole {
    /// We're a console talking to a director.
    #[default]
    Director,
    /// We pretend to be a director talking to a file daemon.
    FileDaemon,
}

impl ConnectionRole {
    /// The prefix of our TLS-PSK identity.
    pub fn identity_prefix(self) -> &'static str {
        match self {
            ConnectionRole::Director => "R_CONSOLE",
            ConnectionRole::FileDaemon => "R_DIRECTOR",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            ConnectionRole::Director => 9101,
            ConnectionRole::FileDaemon => 9102,
        }
    }
}

/// The first message sent after connecting.
pub fn hello(name: &str, role: ConnectionRole, version: ProtocolVersion) -> Vec<u8> {
    match (role, version) {
        (ConnectionRole::FileDaemon, _) => format!("Hello Director {name} calling\n"),
        (ConnectionRole::Director, ProtocolVersion::Bareos124) => {
            format!("Hello {name} calling\n")
        }
        (ConnectionRole::Director, _) => {
            format!("Hello {name} calling version {CLIENT_VERSION}\n")
        }
    }
    .into_bytes()
}

pub fn auth_ok() -> Vec<u8> {
    b"1000 OK auth\n".to_vec()
}

pub fn auth_failed() -> Vec<u8> {
    b"1999 Authorization failed.\n".to_vec()
}

pub fn not_authorized() -> Vec<u8> {
    b"1999 You are not authorized.\n".to_vec()
}

pub fn is_auth_ok(message: &[u8]) -> bool {
    strip_terminator(message) == strip_terminator(&auth_ok())
}

/// Answer to a PAM request: `4002<RS>username<RS>password`.
pub fn pam_user_credentials(username: &str, password: &str) -> Vec<u8> {
    let mut message = id::PAM_USER_CREDENTIALS.to_string().into_bytes();
    message.push(RECORD_SEPARATOR);
    message.extend_from_slice(username.as_bytes());
    message.push(RECORD_SEPARATOR);
    message.extend_from_slice(password.as_bytes());
    message
}

/// The challenge we send to the peer.
pub fn challenge(token: &str, tls_need: u8) -> Vec<u8> {
    format!("auth cram-md5 {token} ssl={tls_need}\n").into_bytes()
}

/// The TLS-PSK identity: `<prefix><RS><name>`.
pub fn tls_psk_identity(identity_prefix: &str, name: &str) -> Vec<u8> {
    let mut identity = identity_prefix.as_bytes().to_vec();
    identity.push(RECORD_SEPARATOR);
    identity.extend_from_slice(name.as_bytes());
    identity
}

/// A challenge received from the peer.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Challenge {
    /// The token including its angle brackets.
    pub token: Vec<u8>,
    /// The peer's TLS requirement (0 none, 1 ok, 2 required).
    pub tls_need: u8,
    /// The peer flagged the challenge as `cram-md5c`.
    /// It then expects the compatible base64 encoding.
    pub compatible: bool,
}

static CHALLENGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^auth cram-md5(c?) (<[^\s>]*>) ssl=(\d)").expect("static regex is valid")
});

pub fn parse_challenge(message: &[u8]) -> Option<Challenge> {
    let captures = CHALLENGE_REGEX.captures(strip_terminator(message))?;
    let tls_need = captures[3][0] - b'0';

    Some(Challenge {
        token: captures[2].to_vec(),
        tls_need,
        compatible: !captures[1].is_empty(),
    })
}

/// A status line like `1000 OK auth` or `1000<RS>OK: bareos-dir Version: 23.0.0`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct StatusLine {
    pub code: u32,
    pub text: String,
}

static STATUS_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s-u)^(\d{4})[ \x1e]?(.*)$").expect("static regex is valid"));

pub fn parse_status_line(message: &[u8]) -> Option<StatusLine> {
    let captures = STATUS_LINE_REGEX.captures(strip_terminator(message))?;
    let code = std::str::from_utf8(&captures[1]).ok()?.parse().ok()?;

    Some(StatusLine {
        code,
        text: String::from_utf8_lossy(&captures[2]).into_owned(),
    })
}

/// Remove trailing newlines and NUL bytes, which some peers append to auth lines.
pub fn strip_terminator(message: &[u8]) -> &[u8] {
    let end = message
        .iter()
        .rposition(|byte| !matches!(byte, b'\n' | b'\r' | b'\0'))
        .map_or(0, |position| position + 1);
    &message[..end]
}

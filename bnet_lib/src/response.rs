//! Reassembly of command responses.
//!
//! A response to a single command might be split into any number of frames.
//! Bareos doesn't mark the end of a response in a uniform way. It's either a signal
//! (e.g. the main prompt) or a line in the payload with a known format, which depends on the
//! mode the console is in. The latter is detected by a [Terminator].
use std::sync::Arc;

use regex::bytes::Regex;

/// Detects the end of a response in the received data.
#[derive(Clone)]
pub enum Terminator {
    /// Only signals end a response.
    Signal,
    /// A regex, matched against the last (possibly incomplete) lines of the response.
    Regex(Regex),
    /// Any custom predicate. It gets the tail of the buffer and returns the end of the
    /// response relative to that tail.
    Custom(Arc<dyn Fn(&[u8]) -> Option<usize> + Send + Sync>),
}

impl std::fmt::Debug for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminator::Signal => f.write_str("Terminator::Signal"),
            Terminator::Regex(regex) => write!(f, "Terminator::Regex({:?})", regex.as_str()),
            Terminator::Custom(_) => f.write_str("Terminator::Custom"),
        }
    }
}

/// A status code followed by `OK` at the start of a line, e.g. `1000 OK: bareos-dir`.
pub const CONSOLE_PATTERN: &str = r"(?m-u)^\d{4} OK[^\n]*\n";

/// A complete JSON-RPC result in compact mode, which is always a single line.
pub const JSON_PATTERN: &str = r#"(?m-u)^\{"jsonrpc".*\}\n"#;

impl Terminator {
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Terminator::Regex(Regex::new(pattern)?))
    }

    pub fn custom(predicate: impl Fn(&[u8]) -> Option<usize> + Send + Sync + 'static) -> Self {
        Terminator::Custom(Arc::new(predicate))
    }

    /// The default for plain console sessions.
    pub fn console() -> Self {
        Terminator::Regex(Regex::new(CONSOLE_PATTERN).expect("static regex is valid"))
    }

    /// The default for console sessions in JSON API mode.
    pub fn json() -> Self {
        Terminator::Regex(Regex::new(JSON_PATTERN).expect("static regex is valid"))
    }

    /// Return the end of the response inside `tail`, if the response is complete.
    pub fn find_end(&self, tail: &[u8]) -> Option<usize> {
        match self {
            Terminator::Signal => None,
            Terminator::Regex(regex) => regex.find(tail).map(|found| found.end()),
            Terminator::Custom(predicate) => predicate(tail).map(|end| end.min(tail.len())),
        }
    }
}

impl Default for Terminator {
    fn default() -> Self {
        Terminator::console()
    }
}

/// Collects the payload of frames until a response is complete.
///
/// The buffer only ever contains data that hasn't been returned yet.
/// Data that follows the end of a response is kept for the next one.
#[derive(Default, Debug)]
pub struct ResponseBuffer {
    buffer: Vec<u8>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a frame's payload.
    ///
    /// Only the data starting at the last line that was incomplete before this push is checked
    /// against the terminator. That way, a line that has been split across frames is still
    /// detected, while older lines aren't scanned over and over again.
    ///
    /// Returns the complete response, if the terminator matched.
    pub fn push(&mut self, payload: &[u8], terminator: &Terminator) -> Option<Vec<u8>> {
        let tail_start = self
            .buffer
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(0, |position| position + 1);
        self.buffer.extend_from_slice(payload);

        let end = tail_start + terminator.find_end(&self.buffer[tail_start..])?;
        let remainder = self.buffer.split_off(end);

        Some(std::mem::replace(&mut self.buffer, remainder))
    }

    /// Take everything that has been received so far.
    /// Used when a signal ends the response.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// The data that has been received, but not yet returned.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

//! Execute commands on a [Session] and write the raw responses.
use std::io::{BufRead, Write};

use bnet_lib::Session;

use crate::internal_prelude::*;

/// Execute a single command and write its response.
///
/// Lost connections are re-established if the session's reconnect budget allows it.
pub fn execute(session: &mut Session, command: &str, output: &mut impl Write) -> Result<()> {
    debug!("Executing '{command}'");
    let response = session
        .call_with_reconnect(command)
        .wrap_err_with(|| format!("Failed to execute '{command}'"))?;

    output
        .write_all(&response)
        .and_then(|_| output.flush())
        .wrap_err("Failed to write response")?;

    Ok(())
}

/// Execute every non-empty line of `input` as a command.
///
/// Errors of single commands are logged. Only a connection that can't be recovered ends the
/// loop early.
pub fn execute_lines(
    session: &mut Session,
    input: impl BufRead,
    output: &mut impl Write,
) -> Result<()> {
    for line in input.lines() {
        let line = line.wrap_err("Failed to read command")?;
        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        if let Err(err) = execute(session, command, output) {
            if !session.is_connected() {
                return Err(err);
            }
            error!("{err:?}");
        }
    }

    Ok(())
}

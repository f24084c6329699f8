use std::io::{stdin, stdout};

use bnet::{
    cli::CliArguments,
    console::{execute, execute_lines},
};
use bnet_lib::{Session, settings::Settings};
use clap::Parser;
use color_eyre::{Result, eyre::WrapErr};

/// This is the main entry point of the console.
///
/// - Parse the cli
/// - Initialize logging
/// - Read the config and apply the commandline overrides
/// - Connect, then execute the given command or every line from stdin
fn main() -> Result<()> {
    let opt = CliArguments::parse();

    bnet::tracing::install_tracing(opt.verbose)?;
    color_eyre::install()?;

    let (mut settings, _) = Settings::read(&opt.config).wrap_err("Failed to read configuration.")?;
    if let Some(profile) = &opt.profile {
        settings.load_profile(profile)?;
    }
    opt.apply(&mut settings.connection);

    let config = settings
        .connection
        .session_config()
        .wrap_err("Invalid connection settings.")?;
    let mut session = Session::connect(config).wrap_err_with(|| {
        format!(
            "Failed to connect to {}:{}",
            settings.connection.address,
            settings.connection.port()
        )
    })?;

    let mut output = stdout().lock();
    if opt.command.is_empty() {
        execute_lines(&mut session, stdin().lock(), &mut output)?;
    } else {
        execute(&mut session, &opt.command.join(" "), &mut output)?;
    }

    session.close();
    Ok(())
}

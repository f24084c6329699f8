use std::path::PathBuf;

use bnet_lib::{ConnectionRole, ConnectionSettings, ProtocolVersion};
use clap::{ArgAction, Parser, ValueHint};

#[derive(Parser, Debug)]
#[command(
    name = "bnet",
    about = "Talk to Bareos directors and file daemons",
    author,
    version
)]
pub struct CliArguments {
    /// Verbose mode (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// If provided, bnet only uses this config file.
    ///
    /// This path can also be set via the "BNET_CONFIG_PATH" environment variable.
    /// The commandline option overwrites the environment variable!
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The name of the profile that should be loaded from your config file.
    #[arg(short, long)]
    pub profile: Option<String>,

    /// The hostname or ip address of the daemon.
    #[arg(long, value_hint = ValueHint::Hostname)]
    pub address: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// The name of the named console.
    /// When talking to a file daemon, this is the name of the director we pose as.
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    /// Connect to a file daemon instead of a director.
    #[arg(long)]
    pub file_daemon: bool,

    /// Switch the director console into JSON API mode.
    #[arg(long)]
    pub json: bool,

    /// Pin the protocol version (bareos_12_4 or bareos_18_2).
    #[arg(long)]
    pub protocol_version: Option<ProtocolVersion>,

    #[arg(long, conflicts_with = "require_tls_psk")]
    pub no_tls_psk: bool,

    /// Refuse to connect without TLS-PSK.
    #[arg(long)]
    pub require_tls_psk: bool,

    #[arg(long, requires = "pam_password")]
    pub pam_user: Option<String>,

    #[arg(long, requires = "pam_user")]
    pub pam_password: Option<String>,

    /// The command to execute.
    /// If none is given, commands are read line by line from stdin.
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,
}

impl CliArguments {
    /// Overwrite the configured values with everything that has been given on the commandline.
    pub fn apply(&self, settings: &mut ConnectionSettings) {
        if let Some(address) = &self.address {
            settings.address = address.clone();
        }
        if let Some(port) = self.port {
            settings.port = Some(port);
        }
        if let Some(name) = &self.name {
            settings.name = name.clone();
        }
        if let Some(password) = &self.password {
            settings.password = password.clone();
        }
        if self.file_daemon {
            settings.role = ConnectionRole::FileDaemon;
        }
        if self.json {
            settings.json = true;
        }
        if self.protocol_version.is_some() {
            settings.protocol_version = self.protocol_version;
        }
        if self.no_tls_psk {
            settings.tls_psk_enable = false;
            settings.tls_psk_require = false;
        }
        if self.require_tls_psk {
            settings.tls_psk_enable = true;
            settings.tls_psk_require = true;
        }
        if self.pam_user.is_some() {
            settings.pam_username = self.pam_user.clone();
            settings.pam_password = self.pam_password.clone();
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn overrides() {
        let opt = CliArguments::parse_from([
            "bnet",
            "-vv",
            "--address",
            "bareos.local",
            "--file-daemon",
            "--name",
            "bareos-dir",
            "--protocol-version",
            "bareos_12_4",
            "--no-tls-psk",
            "status",
            "client",
        ]);
        assert_eq!(opt.verbose, 2);
        assert_eq!(opt.command, vec!["status", "client"]);

        let mut settings = ConnectionSettings {
            password: "configured".into(),
            ..Default::default()
        };
        opt.apply(&mut settings);

        assert_eq!(settings.address, "bareos.local");
        assert_eq!(settings.role, ConnectionRole::FileDaemon);
        assert_eq!(settings.port(), 9102);
        assert_eq!(settings.name, "bareos-dir");
        assert_eq!(settings.password, "configured");
        assert_eq!(settings.protocol_version, Some(ProtocolVersion::Bareos124));
        assert!(!settings.tls_psk_enable);
    }

    #[test]
    fn pam_needs_both_values() {
        let result = CliArguments::try_parse_from(["bnet", "--pam-user", "user"]);
        assert!(result.is_err());

        let opt =
            CliArguments::parse_from(["bnet", "--pam-user", "user", "--pam-password", "pass"]);
        let mut settings = ConnectionSettings::default();
        opt.apply(&mut settings);
        assert_eq!(settings.pam_username.as_deref(), Some("user"));
        assert_eq!(settings.pam_password.as_deref(), Some("pass"));
        assert!(opt.command.is_empty());
    }
}

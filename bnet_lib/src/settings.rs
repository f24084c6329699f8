use std::collections::HashMap;
use std::fs::{File, create_dir_all};
use std::io::{BufReader, prelude::*};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shellexpand::tilde;

use crate::{
    auth::PamCredentials,
    credential::Credential,
    error::Error,
    internal_prelude::*,
    message::{ConnectionRole, ProtocolVersion},
    network_blocking::TlsVersion,
    session::SessionConfig,
    setting_defaults::*,
};

/// The environment variable that can be set to overwrite bnet's config path.
pub const BNET_CONFIG_PATH_ENV: &str = "BNET_CONFIG_PATH";

/// Everything needed to connect to a single director or file daemon.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// The hostname or ip address of the daemon.
    #[serde(default = "default_address")]
    pub address: String,
    /// Don't access this property directly, but rather use the getter with the same name.
    ///
    /// The TCP port. Defaults to 9101 for directors and 9102 for file daemons.
    #[serde(default)]
    pub port: Option<u16>,
    /// The name of the named console.
    /// For file daemon connections, this is the name of the director we pretend to be.
    #[serde(default = "default_name")]
    pub name: String,
    /// The name of the daemon. Only used for display purposes.
    #[serde(default)]
    pub dirname: Option<String>,
    #[serde(default)]
    pub role: ConnectionRole,
    #[serde(default)]
    pub password: String,
    /// Pin the protocol version.
    /// If this isn't set, the newest version is used with a fallback to the legacy one.
    #[serde(default)]
    pub protocol_version: Option<ProtocolVersion>,

    /// Try to use TLS-PSK. Needs the `tls_psk` feature.
    #[serde(default = "default_true")]
    pub tls_psk_enable: bool,
    /// Refuse to connect without TLS-PSK.
    #[serde(default)]
    pub tls_psk_require: bool,
    #[serde(default)]
    pub tls_version: TlsVersion,

    /// PAM login for director consoles.
    /// Username and password have to be set together.
    #[serde(default)]
    pub pam_username: Option<String>,
    #[serde(default)]
    pub pam_password: Option<String>,

    /// How often a lost connection may be re-established.
    #[serde(default)]
    pub max_reconnects: u32,
    /// Seconds to wait for each frame header of a response.
    #[serde(default = "default_header_timeout")]
    pub header_timeout: u64,
    /// Seconds to wait for the TCP connection to be established.
    #[serde(default)]
    pub connect_timeout: Option<u64>,

    /// Use the director's JSON API mode.
    #[serde(default)]
    pub json: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            address: default_address(),
            port: None,
            name: default_name(),
            dirname: None,
            role: ConnectionRole::default(),
            password: String::new(),
            protocol_version: None,
            tls_psk_enable: default_true(),
            tls_psk_require: false,
            tls_version: TlsVersion::default(),
            pam_username: None,
            pam_password: None,
            max_reconnects: 0,
            header_timeout: default_header_timeout(),
            connect_timeout: None,
            json: false,
        }
    }
}

impl ConnectionSettings {
    /// The configured port or the role's default port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.role.default_port())
    }

    /// Check for values that can't work.
    pub fn validate(&self) -> Result<(), Error> {
        if self.port == Some(0) {
            return Err(Error::InvalidSettings(
                "The port must be a positive number".into(),
            ));
        }

        if self.pam_username.is_some() != self.pam_password.is_some() {
            return Err(Error::InvalidSettings(
                "PAM username and PAM password have to be set together".into(),
            ));
        }

        if self.tls_psk_require && !self.tls_psk_enable {
            return Err(Error::InvalidSettings(
                "tls_psk_require is set, but tls_psk_enable isn't".into(),
            ));
        }

        if self.header_timeout == 0 {
            return Err(Error::InvalidSettings(
                "The header timeout must be at least one second".into(),
            ));
        }
        if self.connect_timeout == Some(0) {
            return Err(Error::InvalidSettings(
                "The connect timeout must be at least one second".into(),
            ));
        }

        Ok(())
    }

    fn pam(&self) -> Option<PamCredentials> {
        match (&self.pam_username, &self.pam_password) {
            (Some(username), Some(password)) => Some(PamCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Validate the settings and build the configuration for a [crate::Session].
    pub fn session_config(&self) -> Result<SessionConfig, Error> {
        self.validate()?;

        let credential = Credential::new(&self.password);
        let mut config = match self.role {
            ConnectionRole::Director => {
                SessionConfig::director(&self.address, self.port(), credential)
            }
            ConnectionRole::FileDaemon => {
                SessionConfig::file_daemon(&self.address, self.port(), credential, &self.name)
            }
        };

        config.name = self.name.clone();
        config.dirname = self.dirname.clone();
        config.protocol_version = self.protocol_version;
        config.tls_psk_enable = self.tls_psk_enable;
        config.tls_psk_require = self.tls_psk_require;
        config.tls_version = self.tls_version;
        config.pam = self.pam();
        config.max_reconnects = self.max_reconnects;
        config.header_timeout = Duration::from_secs(self.header_timeout);
        config.connect_timeout = self.connect_timeout.map(Duration::from_secs);

        if self.json {
            config = config.json();
        }

        Ok(config)
    }
}

/// The parent settings struct. \
/// This contains the default connection and all profiles.
#[derive(PartialEq, Eq, Clone, Default, Debug, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "Default::default")]
    pub connection: ConnectionSettings,
    /// Named connections, e.g. one per director.
    #[serde(default = "HashMap::new")]
    pub profiles: HashMap<String, ConnectionSettings>,
}

pub fn default_configuration_directory() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bnet"))
}

/// Get the default config directories, in the order they're checked.
fn configuration_directories() -> Vec<PathBuf> {
    if let Some(config_dir) = default_configuration_directory() {
        vec![config_dir, PathBuf::from(".")]
    } else {
        vec![PathBuf::from(".")]
    }
}

/// Little helper which expands a given path's `~` characters to a fully qualified path.
pub fn expand_home(old_path: &Path) -> PathBuf {
    PathBuf::from(tilde(&old_path.to_string_lossy()).into_owned())
}

fn read_file(path: &Path) -> Result<Settings, Error> {
    let file = File::open(path)
        .map_err(|err| Error::IoPathError(path.to_path_buf(), "opening config file", err))?;
    let reader = BufReader::new(file);

    serde_yaml::from_reader(reader).map_err(|err| Error::ConfigDeserialization(err.to_string()))
}

impl Settings {
    /// Try to read existing config files, while using default values for non-existing fields.
    /// If successful, this will return a full config as well as a boolean on whether we found an
    /// existing configuration file or not.
    pub fn read(from_file: &Option<PathBuf>) -> Result<(Settings, bool), Error> {
        // If no explicit path is provided, we look for the BNET_CONFIG_PATH env variable.
        let from_file = from_file
            .clone()
            .or_else(|| std::env::var(BNET_CONFIG_PATH_ENV).map(PathBuf::from).ok());

        if let Some(path) = &from_file {
            return Ok((read_file(&expand_home(path))?, true));
        };

        debug!("Parsing config files");
        for directory in configuration_directories() {
            let path = directory.join("bnet.yml");
            debug!("Checking path: {path:?}");

            if path.is_file() {
                info!("Found config file at: {path:?}");
                return Ok((read_file(&path)?, true));
            }
        }

        info!("No config file found. Use default config.");
        Ok((Settings::default(), false))
    }

    /// Save the current configuration as a file to the given path. \
    /// If no path is given, the default configuration path will be used.
    pub fn save(&self, path: &Option<PathBuf>) -> Result<(), Error> {
        let config_path = if let Some(path) = path {
            expand_home(path)
        } else if let Ok(path) = std::env::var(BNET_CONFIG_PATH_ENV) {
            PathBuf::from(path)
        } else if let Some(path) = default_configuration_directory() {
            path.join("bnet.yml")
        } else {
            return Err(Error::Generic(
                "Failed to resolve default config directory. User home cannot be determined."
                    .into(),
            ));
        };
        let config_dir = config_path
            .parent()
            .ok_or_else(|| Error::InvalidPath("Couldn't resolve config directory".into()))?;

        // Create the config dir, if it doesn't exist yet
        if !config_dir.as_os_str().is_empty() && !config_dir.exists() {
            create_dir_all(config_dir).map_err(|err| {
                Error::IoPathError(config_dir.to_path_buf(), "creating config dir", err)
            })?;
        }

        let content = serde_yaml::to_string(self).map_err(|err| {
            Error::Generic(format!("Configuration file serialization failed:\n{err}"))
        })?;
        let mut file = File::create(&config_path).map_err(|err| {
            Error::IoPathError(config_path.clone(), "creating settings file", err)
        })?;
        file.write_all(content.as_bytes()).map_err(|err| {
            Error::IoPathError(config_path.clone(), "writing settings file", err)
        })?;

        Ok(())
    }

    /// Try to load a profile. Error if it doesn't exist.
    pub fn load_profile(&mut self, profile: &str) -> Result<(), Error> {
        let profile = self.profiles.remove(profile).ok_or_else(|| {
            Error::ConfigDeserialization(format!("Couldn't find profile with name \"{profile}\""))
        })?;

        self.connection = profile;

        Ok(())
    }
}

use std::fs::File;
use std::io::Write;

use bnet_lib::prelude::*;
use color_eyre::Result;
use pretty_assertions::assert_eq;
use tempfile::Builder;

use helper::*;

/// Read a config file, pick a profile and connect with it.
#[test]
fn test_connect_with_profile() -> Result<()> {
    init();
    let peer = spawn_peer(PeerOptions::default(), 1, whoami);

    let tempdir = Builder::new().prefix("bnet_lib-").tempdir()?;
    let path = tempdir.path().join("bnet.yml");
    let mut file = File::create(&path)?;
    write!(
        file,
        r#"
connection:
  address: backup.invalid
  password: nothing
profiles:
  local:
    address: 127.0.0.1
    port: {port}
    name: admin
    password: {PASSWORD}
    tls_psk_enable: false
    max_reconnects: 2
"#,
        port = peer.port
    )?;

    let (mut settings, found) = Settings::read(&Some(path))?;
    assert!(found);
    assert_eq!(settings.connection.address, "backup.invalid");

    settings.load_profile("local")?;
    let config = settings.connection.session_config()?;
    assert_eq!(config.max_reconnects, 2);

    let mut session = Session::connect(config)?;
    assert_eq!(session.call("whoami")?, b"admin\n".to_vec());
    drop(session);

    let log = peer.join();
    assert_eq!(
        log.lock().unwrap().hellos,
        vec!["Hello admin calling version 18.2.5"]
    );
    Ok(())
}

#[test]
fn test_invalid_file() -> Result<()> {
    let tempdir = Builder::new().prefix("bnet_lib-").tempdir()?;
    let path = tempdir.path().join("bnet.yml");
    std::fs::write(&path, "connection:\n  port: not a number\n")?;

    let result = Settings::read(&Some(path));
    assert!(matches!(result, Err(Error::ConfigDeserialization(_))));

    let missing = tempdir.path().join("missing.yml");
    let result = Settings::read(&Some(missing));
    assert!(matches!(result, Err(Error::IoPathError(..))));

    Ok(())
}

use std::io::ErrorKind;
use std::net::TcpListener;

use bnet_lib::prelude::*;
use color_eyre::Result;
use pretty_assertions::assert_eq;

use helper::*;

fn crashing(command: &str) -> Vec<Reply> {
    match command {
        "crash" => vec![Reply::Hangup],
        _ => whoami(command),
    }
}

/// A session that has never been authenticated doesn't even try to reconnect.
#[test]
fn test_no_reconnect_without_authentication() -> Result<()> {
    init();
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();

    let mut config = director_config(port);
    config.max_reconnects = 5;
    let mut session = Session::new(config)?;

    assert!(!session.reconnect());
    assert_eq!(session.reconnects_left(), 5);

    // No connection attempt has been made.
    listener.set_nonblocking(true)?;
    let accepted = listener.accept();
    assert!(matches!(accepted, Err(err) if err.kind() == ErrorKind::WouldBlock));

    Ok(())
}

/// Reconnects are only possible with a budget.
#[test]
fn test_no_reconnect_without_budget() -> Result<()> {
    init();
    let peer = spawn_peer(PeerOptions::default(), 1, crashing);

    let mut session = Session::connect(director_config(peer.port))?;
    let result = session.call_with_reconnect("crash");
    let err = result.expect_err("The peer hung up");
    assert!(err.is_connection_error());
    assert!(!session.is_authenticated());

    assert!(!session.reconnect());
    drop(session);

    assert_eq!(peer.join().lock().unwrap().connections, 1);
    Ok(())
}

#[test]
fn test_call_with_reconnect() -> Result<()> {
    init();
    // The first connection dies on `crash`, the second one works fine.
    let peer = spawn_peer(PeerOptions::default(), 2, crashing);

    let mut config = director_config(peer.port);
    config.max_reconnects = 1;
    let mut session = Session::connect(config)?;

    // The command is repeated on the new connection, where it crashes again.
    let result = session.call_with_reconnect("crash");
    assert!(matches!(result, Err(ref err) if err.is_connection_error()));
    assert_eq!(session.reconnects_left(), 0);

    // The budget is used up.
    assert!(!session.reconnect());
    assert!(matches!(session.call("whoami"), Err(Error::NotConnected)));
    drop(session);

    let log = peer.join();
    let log = log.lock().unwrap();
    assert_eq!(log.connections, 2);
    assert_eq!(
        log.commands,
        vec!["autodisplay off", "crash", "autodisplay off", "crash"]
    );
    // The reconnect uses the negotiated protocol.
    assert_eq!(log.hellos[0], log.hellos[1]);
    Ok(())
}

#[test]
fn test_reconnect_after_hangup() -> Result<()> {
    init();
    let peer = spawn_peer(PeerOptions::default(), 2, crashing);

    let mut config = director_config(peer.port);
    config.max_reconnects = 3;
    let mut session = Session::connect(config)?;

    assert!(session.call("crash").is_err());
    assert!(!session.is_connected());

    assert!(session.reconnect());
    assert!(session.is_authenticated());
    assert_eq!(session.reconnects_left(), 2);
    assert_eq!(session.call("whoami")?, b"admin\n".to_vec());
    drop(session);

    assert_eq!(peer.join().lock().unwrap().connections, 2);
    Ok(())
}

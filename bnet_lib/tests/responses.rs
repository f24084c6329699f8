use std::thread::sleep;
use std::time::Duration;

use bnet_lib::prelude::*;
use color_eyre::Result;
use pretty_assertions::assert_eq;

use helper::*;

/// A response that's split over several frames is reassembled, and whatever follows the
/// terminating line is returned by the next call.
#[test]
fn test_multi_frame_response_with_leftover() -> Result<()> {
    init();
    let peer = spawn_peer(PeerOptions::default(), 1, |command| match command {
        "label" => vec![
            text("Connecting to Storage daemon File\n3000 OK la"),
            text("bel. VolBytes=123"),
            text(" Volume=\"Full-0001\"\nYou have "),
            text("messages.\n"),
            Reply::Signal(Signal::MainPrompt),
        ],
        "messages" => console_reply("12-Oct 10:00 bareos-dir: Job finished\n"),
        _ => vec![Reply::Signal(Signal::MainPrompt)],
    });

    let mut session = Session::connect(director_config(peer.port))?;

    let response = session.call("label")?;
    assert_eq!(
        String::from_utf8_lossy(&response),
        "Connecting to Storage daemon File\n3000 OK label. VolBytes=123 Volume=\"Full-0001\"\n"
    );

    // The data after the terminating line is kept and completed by the following frames.
    let response = session.call("messages")?;
    assert_eq!(String::from_utf8_lossy(&response), "You have messages.\n");
    assert_eq!(session.status(), Some(Signal::MainPrompt));

    // The messages response is next in line.
    let response = session.call_until("messages", &Terminator::Signal)?;
    assert_eq!(
        String::from_utf8_lossy(&response),
        "12-Oct 10:00 bareos-dir: Job finished\n"
    );
    drop(session);
    peer.join();

    Ok(())
}

/// Signals that don't end a response are skipped, the others end it.
#[test]
fn test_signals() -> Result<()> {
    init();
    let peer = spawn_peer(PeerOptions::default(), 1, |command| match command {
        "restore" => vec![
            text("First you select one or more JobIds\n"),
            Reply::Signal(Signal::StartSelect),
            text("1: List last 20 Jobs run\n"),
            Reply::Code(-100),
            Reply::Signal(Signal::EndSelect),
            Reply::Signal(Signal::SubPrompt),
        ],
        "1" => vec![text("Done\n"), Reply::Signal(Signal::EndOfData)],
        "quit" => vec![Reply::Signal(Signal::Terminate)],
        _ => vec![Reply::Signal(Signal::MainPrompt)],
    });

    let mut session = Session::connect(director_config(peer.port))?;

    let response = session.call_until("restore", &Terminator::Signal)?;
    assert_eq!(
        String::from_utf8_lossy(&response),
        "First you select one or more JobIds\n1: List last 20 Jobs run\n"
    );
    assert_eq!(session.status(), Some(Signal::SubPrompt));

    assert_eq!(session.call_args(["1"])?, b"Done\n".to_vec());
    assert_eq!(session.status(), Some(Signal::EndOfData));

    assert_eq!(session.call("quit")?, Vec::<u8>::new());
    assert_eq!(session.status(), Some(Signal::Terminate));
    drop(session);

    let log = peer.join();
    assert_eq!(
        log.lock().unwrap().commands,
        vec!["autodisplay off", "restore", "1", "quit"]
    );
    Ok(())
}

#[test]
fn test_json_mode() -> Result<()> {
    init();
    let peer = spawn_peer(PeerOptions::default(), 1, |command| match command {
        "list jobs" => vec![
            text(r#"{"jsonrpc":"2.0","id":null,"result":{"jobs":[{"#),
            text(r#""jobid":"1"}]}}"#),
            text("\n"),
        ],
        _ => vec![text(r#"{"jsonrpc":"2.0","id":null,"result":{}}"#), text("\n")],
    });

    let mut session = Session::connect(director_config(peer.port).json())?;
    let response = session.call_args(["list", "jobs"])?;
    assert_eq!(
        String::from_utf8_lossy(&response),
        "{\"jsonrpc\":\"2.0\",\"id\":null,\"result\":{\"jobs\":[{\"jobid\":\"1\"}]}}\n"
    );
    drop(session);

    let log = peer.join();
    assert_eq!(
        log.lock().unwrap().commands,
        vec![".api 2 compact=yes", "list jobs"]
    );
    Ok(())
}

/// Header timeouts while waiting for a slow response are ignored.
#[test]
fn test_slow_response() -> Result<()> {
    init();
    let peer = spawn_peer(PeerOptions::default(), 1, |command| {
        if command == "estimate" {
            sleep(Duration::from_millis(1500));
            console_reply("2000 OK estimate files=12 bytes=4096\n")
        } else {
            vec![Reply::Signal(Signal::MainPrompt)]
        }
    });

    let mut config = director_config(peer.port);
    config.header_timeout = Duration::from_millis(500);
    let mut session = Session::connect(config)?;

    let response = session.call("estimate")?;
    assert_eq!(response, b"2000 OK estimate files=12 bytes=4096\n".to_vec());
    drop(session);
    peer.join();

    Ok(())
}

/// A frame that exceeds the size limit can't be skipped, so the connection is dropped
/// instead of reading its payload as the next header.
#[test]
fn test_oversized_frame_drops_connection() -> Result<()> {
    init();
    let peer = spawn_peer(PeerOptions::default(), 2, |command| match command {
        "big" => vec![Reply::Code(2_000_000), Reply::Raw(b"admi".to_vec())],
        _ => whoami(command),
    });

    let mut config = director_config(peer.port);
    config.max_reconnects = 1;
    let mut session = Session::connect(config)?;

    assert!(matches!(session.call("big"), Err(Error::Protocol(_))));
    assert!(!session.is_connected());
    assert!(!session.is_authenticated());
    assert!(matches!(session.call("whoami"), Err(Error::NotConnected)));

    // The lost connection can be replaced.
    let response = session.call_with_reconnect("whoami")?;
    assert_eq!(response, b"admin\n".to_vec());
    assert_eq!(session.reconnects_left(), 0);
    drop(session);

    let log = peer.join();
    let log = log.lock().unwrap();
    assert_eq!(log.connections, 2);
    assert_eq!(
        log.commands,
        vec!["autodisplay off", "big", "autodisplay off", "whoami"]
    );
    Ok(())
}

#[test]
fn test_call_without_connection() -> Result<()> {
    let mut session = Session::new(director_config(9101))?;

    assert!(matches!(session.call("whoami"), Err(Error::NotConnected)));
    assert!(!session.is_connected());
    Ok(())
}

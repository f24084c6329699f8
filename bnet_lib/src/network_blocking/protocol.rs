use std::io::{ErrorKind, Read, Write};

use crate::{
    error::Error,
    frame::{HEADER_SIZE, Header, MAX_PAYLOAD_SIZE, decode_header, encode_header},
    internal_prelude::*,
    signal::{Signal, describe},
};

/// A single frame as it was received.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Frame {
    Payload(Vec<u8>),
    /// A signal, kept as raw header value, as it might be unknown to us.
    Signal(i32),
}

/// Send a payload as a single frame.
/// This is part of the basic protocol beneath all communication. \
///
/// 1. Sends the payload length as i32 in BigEndian mode.
/// 2. Sends the payload.
pub fn send_bytes(payload: &[u8], stream: &mut impl Write) -> Result<(), Error> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::Protocol(format!(
            "Refusing to send {} bytes in a single frame, the limit is {MAX_PAYLOAD_SIZE}.",
            payload.len()
        )));
    }
    trace!("Sending frame with {} bytes", payload.len());

    // The length always fits, as it's bounded by MAX_PAYLOAD_SIZE.
    let header = encode_header(payload.len() as i32);
    stream
        .write_all(&header)
        .map_err(|err| Error::Connection("sending frame header".into(), err))?;
    stream
        .write_all(payload)
        .map_err(|err| Error::Connection("sending frame payload".into(), err))?;
    stream
        .flush()
        .map_err(|err| Error::Connection("flushing frame".into(), err))?;

    Ok(())
}

/// Send a header-only frame carrying a signal.
pub fn send_signal(signal: Signal, stream: &mut impl Write) -> Result<(), Error> {
    trace!("Sending signal {}", describe(signal.code()));
    stream
        .write_all(&encode_header(signal.code()))
        .map_err(|err| Error::Connection("sending signal".into(), err))?;
    stream
        .flush()
        .map_err(|err| Error::Connection("flushing signal".into(), err))?;

    Ok(())
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Read exactly `length` bytes.
///
/// - If the peer closes the connection before everything has been received,
///   [Error::ConnectionLost] is returned.
/// - A read timeout is returned as [Error::Timeout]. The caller decides whether that's fatal.
pub fn receive_bytes(stream: &mut impl Read, length: usize) -> Result<Vec<u8>, Error> {
    let mut payload = vec![0; length];
    let mut received = 0;

    while received < length {
        match stream.read(&mut payload[received..]) {
            Ok(0) => {
                return Err(Error::ConnectionLost(format!(
                    "Failed to retrieve data after {received} of {length} bytes. \
                    Assuming the connection is lost."
                )))
            }
            Ok(count) => received += count,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if is_timeout(&err) => {
                return Err(Error::Timeout(format!(
                    "receiving payload ({received} of {length} bytes)"
                )))
            }
            Err(err) => return Err(Error::Connection("receiving payload".into(), err)),
        }
    }

    Ok(payload)
}

/// Read and decode a frame header.
///
/// A read of zero bytes right at the start means that the peer closed the connection,
/// which results in [Error::SocketEmptyHeader]. This is different from a header with
/// the value `0`, which is a valid signal.
///
/// A timeout is only reported if no byte of the header has been received yet.
/// Once the header has been started, we keep on reading to stay in sync with the stream.
pub fn receive_header(stream: &mut impl Read) -> Result<Header, Error> {
    let mut header = [0; HEADER_SIZE];
    let mut received = 0;

    while received < HEADER_SIZE {
        match stream.read(&mut header[received..]) {
            Ok(0) if received == 0 => return Err(Error::SocketEmptyHeader),
            Ok(0) => {
                return Err(Error::ConnectionLost(format!(
                    "Connection went away after {received} bytes of a frame header."
                )))
            }
            Ok(count) => received += count,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if is_timeout(&err) && received == 0 => {
                return Err(Error::Timeout("receiving frame header".into()))
            }
            Err(err) if is_timeout(&err) => continue,
            Err(err) => return Err(Error::Connection("receiving frame header".into(), err)),
        }
    }

    let value = decode_header(header);
    if value > 0 && value as usize > MAX_PAYLOAD_SIZE {
        error!("Peer announced a frame of {value} bytes, but only {MAX_PAYLOAD_SIZE} are allowed.");
        return Err(Error::Protocol(format!(
            "Frame of {value} bytes exceeds the limit of {MAX_PAYLOAD_SIZE} bytes"
        )));
    }

    Ok(Header::from_value(value))
}

/// Receive a complete frame, header and payload.
pub fn receive_frame(stream: &mut impl Read) -> Result<Frame, Error> {
    match receive_header(stream)? {
        Header::Signal(code) => {
            trace!("Received signal {}", describe(code));
            Ok(Frame::Signal(code))
        }
        Header::Payload(length) => {
            let payload = receive_bytes(stream, length)?;
            trace!("Received frame with {length} bytes");
            Ok(Frame::Payload(payload))
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    fn frames(parts: &[&[u8]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for part in parts {
            send_bytes(part, &mut bytes).unwrap();
        }
        bytes
    }

    #[test]
    fn frame_layout() {
        let mut bytes = Vec::new();
        send_bytes(b"status", &mut bytes).unwrap();
        assert_eq!(bytes, b"\0\0\0\x06status".to_vec());

        let mut bytes = Vec::new();
        send_signal(Signal::EndOfData, &mut bytes).unwrap();
        assert_eq!(bytes, vec![0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn successive_frames() {
        let mut bytes = frames(&[b"first", b"second"]);
        send_signal(Signal::MainPrompt, &mut bytes).unwrap();
        let mut stream = Cursor::new(bytes);

        assert_eq!(
            receive_frame(&mut stream).unwrap(),
            Frame::Payload(b"first".to_vec())
        );
        assert_eq!(
            receive_frame(&mut stream).unwrap(),
            Frame::Payload(b"second".to_vec())
        );
        assert_eq!(
            receive_frame(&mut stream).unwrap(),
            Frame::Signal(Signal::MainPrompt.code())
        );
        // Nothing left, which looks like a closed connection.
        assert!(matches!(
            receive_frame(&mut stream),
            Err(Error::SocketEmptyHeader)
        ));
    }

    #[test]
    fn zero_header_is_a_signal() {
        let mut stream = Cursor::new(vec![0, 0, 0, 0]);
        assert_eq!(receive_header(&mut stream).unwrap(), Header::Signal(0));
    }

    #[test]
    fn truncated_payload() {
        let mut bytes = encode_header(10).to_vec();
        bytes.extend_from_slice(b"abc");
        let mut stream = Cursor::new(bytes);

        assert!(matches!(
            receive_frame(&mut stream),
            Err(Error::ConnectionLost(_))
        ));
    }

    #[test]
    fn truncated_header() {
        let mut stream = Cursor::new(vec![0, 0]);
        assert!(matches!(
            receive_header(&mut stream),
            Err(Error::ConnectionLost(_))
        ));
    }

    /// Ensure there's no huge allocation if a peer announces a gigantic frame.
    #[test]
    fn restricted_payload_size() {
        let mut stream = Cursor::new(encode_header(i32::MAX).to_vec());
        assert!(matches!(
            receive_header(&mut stream),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn header_timeout_is_reported() -> Result<(), Error> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept the connection, but stay silent until the client is done.
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();

        assert!(matches!(
            receive_header(&mut client),
            Err(Error::Timeout(_))
        ));

        // Once the peer is gone, the next header read sees an empty read.
        handle.join().unwrap();
        client.set_read_timeout(None).unwrap();
        assert!(matches!(
            receive_header(&mut client),
            Err(Error::SocketEmptyHeader)
        ));

        Ok(())
    }
}

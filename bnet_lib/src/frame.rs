//! Frame header encoding.
//!
//! Every frame starts with a signed 32 bit integer in big endian byte order.
//! A positive value is the length of the payload that follows.
//! Zero and negative values are [signals](crate::signal::Signal) without payload.
use byteorder::{BigEndian, ByteOrder};

use crate::signal::Signal;

pub const HEADER_SIZE: usize = 4;

/// The largest payload that may be put into a single frame.
/// Bareos refuses bigger frames, so longer messages have to be split.
pub const MAX_PAYLOAD_SIZE: usize = 1_000_000;

pub fn encode_header(value: i32) -> [u8; HEADER_SIZE] {
    let mut header = [0; HEADER_SIZE];
    BigEndian::write_i32(&mut header, value);
    header
}

pub fn decode_header(header: [u8; HEADER_SIZE]) -> i32 {
    BigEndian::read_i32(&header)
}

/// A decoded frame header.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Header {
    /// A payload of this many bytes follows.
    Payload(usize),
    /// A signal. The raw value is kept, as it might be unknown to us.
    Signal(i32),
}

impl Header {
    pub fn from_value(value: i32) -> Self {
        if value > 0 {
            Header::Payload(value as usize)
        } else {
            Header::Signal(value)
        }
    }

    /// The known signal behind this header, if any.
    pub fn signal(&self) -> Option<Signal> {
        match self {
            Header::Payload(_) => None,
            Header::Signal(code) => Signal::from_code(*code),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn known_values() {
        assert_eq!(encode_header(5), [0, 0, 0, 5]);
        assert_eq!(encode_header(-1), [0xff, 0xff, 0xff, 0xff]);
        assert_eq!(encode_header(-18), [0xff, 0xff, 0xff, 0xee]);
        assert_eq!(decode_header([0, 0, 1, 0]), 256);
    }

    #[test]
    fn header_kinds() {
        assert_eq!(Header::from_value(12), Header::Payload(12));
        assert_eq!(Header::from_value(0), Header::Signal(0));
        assert_eq!(
            Header::from_value(-18).signal(),
            Some(Signal::MainPrompt)
        );
        assert_eq!(Header::from_value(0).signal(), None);
    }

    proptest! {
        #[test]
        fn header_round_trip(value in any::<i32>()) {
            prop_assert_eq!(decode_header(encode_header(value)), value);
        }
    }
}

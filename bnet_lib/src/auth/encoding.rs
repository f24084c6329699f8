//! The two base64 flavours used for CRAM-MD5 responses.
//!
//! Bareos has its own base64 encoder, which never pads its output.
//! In "compatible" mode it produces standard base64 without padding.
//! The legacy mode sign-extends every input byte before shifting it into the bit register
//! and doesn't left-align the trailing bits. Older daemons only produce the legacy form,
//! so both have to be accepted.
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

pub fn compatible(bytes: &[u8]) -> String {
    STANDARD_NO_PAD.encode(bytes)
}

pub fn legacy(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 4 / 3 + 2);
    let mut register: u32 = 0;
    let mut bits: u32 = 0;
    let mut index = 0;

    while index < bytes.len() {
        if bits < 6 {
            register <<= 8;
            // Sign extension is intended here.
            register |= bytes[index] as i8 as i32 as u32;
            index += 1;
            bits += 8;
        }
        output.push(ALPHABET[((register >> (bits - 6)) & 0x3f) as usize] as char);
        bits -= 6;
    }

    if bits > 0 {
        let mask = (1 << bits) - 1;
        output.push(ALPHABET[(register & mask) as usize] as char);
    }

    output
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn compatible_is_unpadded_standard_base64() {
        assert_eq!(compatible(b""), "");
        assert_eq!(compatible(b"f"), "Zg");
        assert_eq!(compatible(b"foobar"), "Zm9vYmFy");
        assert_eq!(compatible(&[0xff]), "/w");
    }

    #[test]
    fn legacy_flavour() {
        assert_eq!(legacy(b""), "");
        // The trailing bits aren't shifted to the left.
        assert_eq!(legacy(&[0x00, 0x01]), "AAB");
        // Bytes >= 0x80 are sign-extended.
        assert_eq!(legacy(&[0xff]), "/D");
    }

    #[test]
    fn flavours_agree_for_ascii_in_full_blocks() {
        // Without high bits and without trailing bits, both flavours are identical.
        assert_eq!(legacy(b"foobar"), compatible(b"foobar"));
        assert_eq!(legacy(b"abc"), "YWJj");
    }

    #[test]
    fn digest_length() {
        let digest = [0xa5; 16];
        assert_eq!(compatible(&digest).len(), 22);
        assert_eq!(legacy(&digest).len(), 22);
        assert_ne!(compatible(&digest), legacy(&digest));
    }
}

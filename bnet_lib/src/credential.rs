//! The password used to authenticate against a Bareos daemon.
use md5::{Digest, Md5};

/// A plaintext password.
///
/// Bareos never uses the password directly.
/// Its MD5 digest, in lowercase hex form, is the key for the CRAM-MD5 handshake
/// and the secret for TLS-PSK.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    digest: [u8; 16],
}

impl Credential {
    pub fn new(password: impl AsRef<[u8]>) -> Self {
        let mut digest = [0; 16];
        digest.copy_from_slice(&Md5::digest(password.as_ref()));
        Credential { digest }
    }

    /// The raw 16 digest bytes.
    pub fn md5(&self) -> [u8; 16] {
        self.digest
    }

    pub fn md5_hex(&self) -> String {
        self.digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    /// The key material as it's used on the wire.
    pub fn key(&self) -> Vec<u8> {
        self.md5_hex().into_bytes()
    }
}

// Don't leak anything password related into logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("digest", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn md5_hex() {
        let credential = Credential::new("secret");
        assert_eq!(credential.md5_hex(), "5ebe2294ecd0e0f08eab7690d2a6ee69");
        assert_eq!(credential.key(), b"5ebe2294ecd0e0f08eab7690d2a6ee69".to_vec());
        assert_eq!(credential.md5()[0], 0x5e);
    }

    #[test]
    fn debug_is_redacted() {
        let credential = Credential::new("secret");
        let output = format!("{credential:?}");
        assert!(!output.contains("5ebe"));
    }
}

use data_encoding::{BASE32_NOPAD, HEXLOWER};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Random bytes in a freshly minted vote token.
pub const TOKEN_BYTES: usize = 10;

/// Generate a random vote token: 16 upper-case base32 characters, safe to
/// embed in a pre-filled ballot link.
pub fn random_token() -> String {
    let mut bytes = [0; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

/// Generate a random lower-case hex identifier of `bytes` random bytes.
pub fn random_hex(bytes: usize) -> String {
    let mut buffer = vec![0; bytes];
    rand::thread_rng().fill_bytes(&mut buffer);
    HEXLOWER.encode(&buffer)
}

/// Keyed digest of vote tokens. Only digests are stored, so a leaked token
/// table cannot be replayed against open ballots.
#[derive(Clone)]
pub struct TokenDigester {
    secret: Vec<u8>,
}

impl TokenDigester {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    /// Hex HMAC-SHA256 of the trimmed token.
    pub fn digest(&self, token: &str) -> String {
        let mut hmac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        hmac.update(token.trim().as_bytes());
        HEXLOWER.encode(&hmac.finalize().into_bytes())
    }
}

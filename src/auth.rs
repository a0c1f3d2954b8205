//! Credential primitives: salted password digests and opaque bearer tokens.
//!
//! Secrets are never stored. A password is kept as `hex(salt)$hex(digest)`
//! with a random per-user salt; an access token is random hex handed to the
//! client, with only its Blake2b digest kept in the `access_tokens` table.

use digest::Digest;
use rand::RngCore;

type Hasher = blake2::Blake2b;

const SALT_LEN: usize = 16;
const TOKEN_LEN: usize = 32;

fn salted_digest(salt: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut hasher = Hasher::new();
    hasher.input(salt);
    hasher.input(secret);
    hasher.result().to_vec()
}

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = salted_digest(&salt, password.as_bytes());
    format!("{}${}", hex::encode(&salt[..]), hex::encode(digest))
}

/// Checks `password` against a stored `hex(salt)$hex(digest)` string.
/// Malformed stored values fail closed.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(2, '$');
    let (salt_hex, digest_hex) = match (parts.next(), parts.next()) {
        (Some(salt), Some(digest)) => (salt, digest),
        _ => return false,
    };
    let salt = match hex::decode(salt_hex) {
        Ok(salt) => salt,
        Err(_) => return false,
    };
    let expected = match hex::decode(digest_hex) {
        Ok(digest) => digest,
        Err(_) => return false,
    };
    salted_digest(&salt, password.as_bytes()) == expected
}

/// Returns a fresh bearer token and the digest to persist for it.
pub fn generate_token() -> (String, Vec<u8>) {
    let mut bytes = [0u8; TOKEN_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(&bytes[..]);
    let digest = token_digest(&token);
    (token, digest)
}

/// Digest of a presented token, for lookup against the stored value.
pub fn token_digest(token: &str) -> Vec<u8> {
    Hasher::digest(token.as_bytes()).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let stored = hash_password("hunter2");
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
        assert!(!verify_password("", &stored));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("hunter2"), hash_password("hunter2"));
    }

    #[test]
    fn malformed_stored_values_fail_closed() {
        assert!(!verify_password("hunter2", ""));
        assert!(!verify_password("hunter2", "no-dollar-sign"));
        assert!(!verify_password("hunter2", "zz$zz"));
        assert!(!verify_password("hunter2", "abcd$"));
    }

    #[test]
    fn token_digest_is_stable_and_distinct() {
        let (token, digest) = generate_token();
        assert_eq!(token.len(), TOKEN_LEN * 2);
        assert_eq!(token_digest(&token), digest);
        let (other, other_digest) = generate_token();
        assert_ne!(token, other);
        assert_ne!(digest, other_digest);
    }
}

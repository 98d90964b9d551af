//! Bearer-token authentication, compared in constant time against a
//! SHA-256 digest computed once at startup.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

pub fn token_eq(candidate: &str, expected_hash: &[u8]) -> bool {
    let candidate_hash = Sha256::digest(candidate.as_bytes());
    candidate_hash.as_slice().ct_eq(expected_hash).into()
}

/// Extract a bearer token from an `Authorization: Bearer <token>` header
/// value, or a raw query-string value (for the WebSocket upgrade, which
/// can't set headers from a browser `EventSource`-style client).
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    header.and_then(|h| h.strip_prefix("Bearer ")).map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_eq_matches_identical_token() {
        let hash = hash_token("secret");
        assert!(token_eq("secret", &hash));
    }

    #[test]
    fn token_eq_rejects_wrong_token() {
        let hash = hash_token("secret");
        assert!(!token_eq("wrong", &hash));
    }

    #[test]
    fn extract_bearer_strips_prefix() {
        assert_eq!(extract_bearer(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_bearer(Some("Basic abc123")), None);
        assert_eq!(extract_bearer(None), None);
    }
}

//! HMAC-SHA256 signatures shared with the payment provider.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature against `payload`.
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret_key";
    const PAYLOAD: &[u8] = br#"{"reference":"ORD123-ab","status":"success"}"#;

    #[test]
    fn test_signature_is_hex_sha256() {
        let signature = sign(SECRET, PAYLOAD);
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_accepts_matching_signature() {
        let signature = sign(SECRET, PAYLOAD);
        assert!(verify(SECRET, PAYLOAD, &signature));
        assert!(verify(SECRET, PAYLOAD, &signature.to_uppercase()));
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let signature = sign(SECRET, PAYLOAD);
        assert!(!verify(SECRET, br#"{"reference":"ORD123-ab","status":"failed"}"#, &signature));
    }

    #[test]
    fn test_verify_rejects_wrong_secret_and_garbage() {
        let signature = sign("other_secret", PAYLOAD);
        assert!(!verify(SECRET, PAYLOAD, &signature));
        assert!(!verify(SECRET, PAYLOAD, "not-hex"));
        assert!(!verify(SECRET, PAYLOAD, ""));
    }
}

//! Canonical JSON body construction and HMAC-SHA256 request signing (§4.4,
//! §6, §9 "Signing stability").

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Serializes `body` to bytes. `serde_json::Value`'s object type is a
/// `BTreeMap` (this crate does not enable serde_json's `preserve_order`
/// feature), so keys always serialize in lexicographic order — exactly the
/// "canonical, keys sorted" requirement in §4.4 and §6, with no separate
/// sorting pass needed.
pub fn canonical_bytes(body: &Value) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(body)
}

/// HMAC-SHA256 of `body_bytes` under `secret_key`, base64-encoded with no
/// line breaks, for the `X-Signature` header.
///
/// Callers must pass the *exact* bytes that go on the wire — never
/// re-serialize between signing and sending (§9).
pub fn sign(secret_key: &str, body_bytes: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body_bytes);
    BASE64.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_serialize_in_sorted_order() {
        let body = json!({"z": 1, "a": 2, "m": {"y": 1, "b": 2}});
        let bytes = canonical_bytes(&body).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"a":2,"m":{"b":2,"y":1},"z":1}"#);
    }

    #[test]
    fn signature_is_deterministic_for_identical_bytes() {
        let a = sign("secret", b"hello");
        let b = sign("secret", b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_the_key() {
        let a = sign("secret-a", b"hello");
        let b = sign("secret-b", b"hello");
        assert_ne!(a, b);
    }
}

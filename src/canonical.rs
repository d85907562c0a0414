//! Canonical JSON encoding and the `Signer` port.
//!
//! Signing is behind a library-neutral `Signer` port rather than a
//! concrete key type; canonicalization (sorted keys, UTF-8, no whitespace,
//! millisecond ISO-8601 timestamps) is the core's own responsibility, done
//! once here and reused by reputation proofs and tracking-event hashes
//! (§6).

use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serialize a value to canonical JSON: keys sorted ascending, UTF-8, no
/// insignificant whitespace. `serde_json::Value`'s `BTreeMap`-backed object
/// representation already sorts keys on serialization once round-tripped
/// through `Value`, which is what we do here rather than trust struct field
/// order.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let as_value = serde_json::to_value(value)?;
    let sorted = sort_keys(as_value);
    serde_json::to_vec(&sorted)
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// SHA-256 of raw bytes, hex-encoded lowercase — used for tracking proof of
/// delivery hashes (§4.5) and the reputation `events_hash` (§4.3).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// ECDSA P-256 signing/verification port (§9).
///
/// Any ECDSA P-256 library can back this; the core only ever calls through
/// the trait, never touches a web-crypto or platform-specific API.
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> Vec<u8>;
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

/// Reference `Signer` backed by `p256`, suitable for tests and for
/// single-process deployments that hold the signing key in-process.
pub struct P256Signer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl P256Signer {
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand_core::OsRng);
        let verifying_key = *signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = *signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }
}

impl Signer for P256Signer {
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(message);
        signature.to_der().as_bytes().to_vec()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        verify_with_key(&self.verifying_key, message, signature)
    }
}

/// Stateless verification against a known public key, used by
/// `reputation::proof::verify` which does not hold the signing key.
pub fn verify_with_key(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(sig) = Signature::from_der(signature) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

/// Base64 (standard, padded) encoding for signature bytes on the wire, so a
/// serialized [`crate::reputation::proof::ReputationProof`] reads as a JSON
/// string rather than an array of small integers.
pub mod b64_signature {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys() {
        let value = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        let bytes = canonicalize(&value).unwrap();
        let s = String::from_utf8(bytes).unwrap();
        assert_eq!(s, r#"{"a":2,"b":1,"c":{"y":2,"z":1}}"#);
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let signer = P256Signer::generate();
        let message = b"canonical payload";
        let sig = signer.sign(message);
        assert!(signer.verify(message, &sig));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let signer = P256Signer::generate();
        let sig = signer.sign(b"original");
        assert!(!signer.verify(b"tampered", &sig));
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let signer = P256Signer::generate();
        let mut sig = signer.sign(b"message");
        sig[0] ^= 0xFF;
        assert!(!signer.verify(b"message", &sig));
    }
}

//! Golden test vectors for deterministic verification.
//!
//! These pin the byte-level behavior other implementations must match:
//! address derivation, policy digests, and the local cipher.

use haven_crypt_core::{policy_digest, seal, AccessCondition, EncryptionKey, Identity, Iv, Sha256Digest};

/// The identity whose secret key is `0x00..01`.
pub const UNIT_KEY_HEX: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

/// Address of [`UNIT_KEY_HEX`].
pub const UNIT_KEY_ADDRESS: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";

/// A policy and the hex SHA-256 of its canonical tagged JSON.
#[derive(Debug, Clone)]
pub struct PolicyVector {
    pub name: &'static str,
    pub policy: Vec<AccessCondition>,
    pub expected_digest: &'static str,
}

/// A local cipher case.
#[derive(Debug, Clone)]
pub struct CipherVector {
    pub name: &'static str,
    pub key: [u8; 32],
    pub iv: [u8; 12],
    pub plaintext: &'static [u8],
    pub expected_ciphertext: &'static str,
    pub expected_plaintext_digest: &'static str,
}

pub fn policy_vectors() -> Vec<PolicyVector> {
    vec![
        PolicyVector {
            name: "owner-only for the unit key on ethereum",
            policy: vec![AccessCondition::owner_only(UNIT_KEY_ADDRESS, "ethereum")],
            expected_digest: "f5942f991b7e6f284fb0acbca5e7fde8cd20cbd6737333d9868b7145c28f9b9a",
        },
        PolicyVector {
            name: "public on ethereum",
            policy: vec![AccessCondition::public("ethereum")],
            expected_digest: "cdbc9684e21eae8b74d987edb60055994cac3a1bb630f5baf92e2b54ed173d98",
        },
        PolicyVector {
            name: "public on polygon",
            policy: vec![AccessCondition::public("polygon")],
            expected_digest: "a42469134ebe58c6465207c0f8f63f6131f04c85e1f3faafbf07a323854ffe72",
        },
    ]
}

pub fn cipher_vectors() -> Vec<CipherVector> {
    vec![
        CipherVector {
            name: "hello haven",
            key: [0x42; 32],
            iv: [0x24; 12],
            plaintext: b"Hello, Haven!",
            expected_ciphertext: "ac62e96284f278e0e41dede5c5e089b75345d6c9ea4109aeffabc85f78",
            expected_plaintext_digest: "5459afc9b3cc423e7e4f8075ba5bc7170d1138fd34db41ce95de632ba28d72a3",
        },
        CipherVector {
            name: "empty payload",
            key: [0x42; 32],
            iv: [0x24; 12],
            plaintext: b"",
            expected_ciphertext: "3f51eace5bd1df2f4656bf812c77a1df",
            expected_plaintext_digest: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        },
    ]
}

/// Check every vector. Returns `(name, matches, actual)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut results = Vec::new();

    let address = Identity::from_private_key_hex(UNIT_KEY_HEX)
        .map(|id| id.address().to_hex())
        .unwrap_or_default();
    results.push(("unit key address".to_string(), address == UNIT_KEY_ADDRESS, address));

    for v in policy_vectors() {
        let digest = policy_digest(&v.policy).unwrap_or_default();
        results.push((v.name.to_string(), digest == v.expected_digest, digest));
    }

    for v in cipher_vectors() {
        let key = EncryptionKey::from_bytes(v.key);
        let actual = seal(v.plaintext, &key, &Iv::from_bytes(v.iv))
            .map(hex::encode)
            .unwrap_or_default();
        let digest = Sha256Digest::hash(v.plaintext).to_hex();
        let matches = actual == v.expected_ciphertext && digest == v.expected_plaintext_digest;
        results.push((v.name.to_string(), matches, actual));
    }

    results
}

//! Proptest generators for property-based testing.

use proptest::prelude::*;

use haven_crypt_core::{
    generate_iv, AccessCondition, Comparator, EncryptionMetadata, Identity, ReturnValueTest, TokenStandard,
    CIPHER_ID, METADATA_VERSION, USER_ADDRESS,
};

/// A random signing identity.
pub fn identity() -> impl Strategy<Value = Identity> {
    any::<[u8; 32]>().prop_filter_map("valid secp256k1 scalar", |bytes| Identity::from_bytes(&bytes).ok())
}

/// Payload bytes up to `max_len`.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

pub fn chain() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("ethereum".to_string()),
        Just("polygon".to_string()),
        Just("base".to_string()),
        "[a-z]{3,12}".prop_map(String::from),
    ]
}

pub fn comparator() -> impl Strategy<Value = Comparator> {
    prop_oneof![
        Just(Comparator::Eq),
        Just(Comparator::Ne),
        Just(Comparator::Gt),
        Just(Comparator::Ge),
        Just(Comparator::Lt),
        Just(Comparator::Le),
        Just(Comparator::Contains),
    ]
}

/// A 20-byte hex address.
pub fn address_hex() -> impl Strategy<Value = String> {
    any::<[u8; 20]>().prop_map(|bytes| format!("0x{}", hex::encode(bytes)))
}

/// Any single condition, preset-shaped or free-form.
pub fn access_condition() -> impl Strategy<Value = AccessCondition> {
    prop_oneof![
        (address_hex(), chain()).prop_map(|(addr, chain)| AccessCondition::owner_only(&addr, &chain)),
        chain().prop_map(|chain| AccessCondition::public(&chain)),
        (address_hex(), chain()).prop_map(|(contract, chain)| {
            AccessCondition::token_holder(&contract, TokenStandard::Erc721, &chain)
        }),
        (address_hex(), chain(), any::<u64>()).prop_map(|(contract, chain, min)| {
            AccessCondition::min_balance(&contract, TokenStandard::Erc20, &chain, u128::from(min))
        }),
        (address_hex(), chain(), "[a-zA-Z_]{1,16}", comparator(), "[0-9]{1,6}").prop_map(
            |(contract, chain, method, comparator, value)| AccessCondition {
                contract_address: contract,
                standard_contract_type: String::new(),
                chain,
                method,
                parameters: vec![USER_ADDRESS.to_string()],
                return_value_test: ReturnValueTest { comparator, value },
            }
        ),
    ]
}

/// A non-empty policy.
pub fn policy() -> impl Strategy<Value = Vec<AccessCondition>> {
    prop::collection::vec(access_condition(), 1..4)
}

/// Structurally valid metadata with arbitrary contents.
pub fn metadata() -> impl Strategy<Value = EncryptionMetadata> {
    (
        "[A-Za-z0-9+/]{8,64}",
        "[0-9a-f]{64}",
        policy(),
        chain(),
        proptest::option::of(any::<u32>()),
    )
        .prop_map(|(wrapped_key, key_digest, access_policy, chain, size)| EncryptionMetadata {
            version: METADATA_VERSION.to_string(),
            wrapped_key,
            key_digest,
            iv: generate_iv(),
            cipher: CIPHER_ID.to_string(),
            access_policy,
            chain,
            original_mime_type: None,
            original_size: size.map(u64::from),
            original_digest: None,
            extensions: Default::default(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_crypt::{EncryptOptions, EngineError};
    use haven_crypt_core::{
        decode_metadata, encode_metadata, policy_digest, CoreError, CryptoError, ValidationError,
    };

    use crate::fixtures::TestFixture;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    /// Owner-only for the fixture identity, or public, on `chain`.
    fn policy_for(fixture: &TestFixture, public: bool, chain: &str) -> Vec<AccessCondition> {
        if public {
            vec![AccessCondition::public(chain)]
        } else {
            vec![AccessCondition::owner_only(&fixture.identity.address().to_hex(), chain)]
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn engine_roundtrip_restores_plaintext(
            plaintext in payload(4096),
            chain in chain(),
            public in any::<bool>(),
        ) {
            let fixture = TestFixture::new();
            let policy = policy_for(&fixture, public, &chain);
            let options = EncryptOptions { chain: Some(chain.clone()), mime_type: None };

            let restored = runtime().block_on(async {
                let engine = fixture.connected_engine().await;
                let encrypted = engine
                    .encrypt(&plaintext, &fixture.identity, &policy, &options, None)
                    .await
                    .unwrap();
                engine
                    .decrypt(&encrypted.ciphertext, &encrypted.metadata, &fixture.identity, None)
                    .await
                    .unwrap()
            });
            prop_assert_eq!(restored, plaintext);
        }

        #[test]
        fn engine_detects_any_flipped_byte(
            plaintext in payload(1024),
            index in any::<prop::sample::Index>(),
            mask in 1u8..,
        ) {
            let fixture = TestFixture::new();
            let policy = fixture.owner_policy();

            let result = runtime().block_on(async {
                let engine = fixture.connected_engine().await;
                let encrypted = engine
                    .encrypt(&plaintext, &fixture.identity, &policy, &EncryptOptions::default(), None)
                    .await
                    .unwrap();
                let mut tampered = encrypted.ciphertext.clone();
                let at = index.index(tampered.len());
                tampered[at] ^= mask;
                engine
                    .decrypt(&tampered, &encrypted.metadata, &fixture.identity, None)
                    .await
            });
            prop_assert!(matches!(
                result,
                Err(EngineError::Crypto(CryptoError::AuthenticationFailed))
            ));
        }
    }

    proptest! {
        #[test]
        fn metadata_survives_the_codec(meta in metadata()) {
            let text = encode_metadata(&meta).unwrap();
            prop_assert_eq!(decode_metadata(&text).unwrap(), meta);
        }

        #[test]
        fn policy_digest_is_deterministic(policy in policy()) {
            let d1 = policy_digest(&policy).unwrap();
            let d2 = policy_digest(&policy.clone()).unwrap();
            prop_assert_eq!(d1, d2);
        }

        #[test]
        fn foreign_versions_are_rejected(mut meta in metadata(), version in "hybrid-v[2-9]|v[0-9]") {
            meta.version = version;
            let text = encode_metadata(&meta).unwrap();
            prop_assert!(matches!(
                decode_metadata(&text),
                Err(CoreError::Validation(ValidationError::UnsupportedVersion(_)))
            ));
        }

        #[test]
        fn identity_signatures_recover(id in identity(), message in "[ -~]{0,64}") {
            let signature = id.sign_message(&message).unwrap();
            let recovered = haven_crypt_core::recover_address(&message, &signature).unwrap();
            prop_assert_eq!(recovered, id.address());
        }
    }
}

#![allow(
    missing_docs,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::uninlined_format_args
)]

use apns_auth::{jwt, SigningKey};
use p256::ecdsa;
use proptest::prelude::*;

fn arb_id() -> impl Strategy<Value = String> {
    "[A-Z0-9]{10}"
}

proptest! {
    // Keep case count low: each case performs an ECDSA keygen + sign + verify.
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn mint_decode_verify_round_trip(key_id in arb_id(), team_id in arb_id(), iat in 0u64..=4_102_444_800) {
        let key = SigningKey::new(
            key_id.clone(),
            team_id.clone(),
            ecdsa::SigningKey::random(&mut rand::rngs::OsRng),
        );
        let token = jwt::mint(&key, iat).unwrap();

        let decoded = jwt::verify(&token, &key.verification_key()).unwrap();
        prop_assert_eq!(decoded.header.kid.clone(), key_id);
        prop_assert_eq!(decoded.header.alg.clone(), "ES256");
        prop_assert_eq!(decoded.claims.iss.clone(), team_id);
        prop_assert_eq!(decoded.claims.iat, iat);
        prop_assert_eq!(decoded.signature.len(), 64);

        // Re-encoding the decoded form reproduces the signed segments
        // byte for byte.
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&decoded.header).unwrap());
        let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&decoded.claims).unwrap());
        let sig_b64 = URL_SAFE_NO_PAD.encode(&decoded.signature);
        prop_assert_eq!(format!("{header_b64}.{claims_b64}.{sig_b64}"), token);
    }
}

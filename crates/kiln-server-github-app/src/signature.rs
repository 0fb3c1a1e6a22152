// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! HMAC-SHA256 helpers shared by webhook verification and cache key derivation.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::error::GithubAppError;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Hex-encoded HMAC-SHA256 of `payload` under `key`.
pub fn hmac_sha256_hex(key: &[u8], payload: &[u8]) -> String {
	let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
	mac.update(payload);
	hex::encode(mac.finalize().into_bytes())
}

/// Check an `X-Hub-Signature-256` header (`sha256=<hex>`) against the body in
/// constant time.
pub fn verify_webhook_signature(
	secret: &[u8],
	signature_header: &str,
	body: &[u8],
) -> Result<(), GithubAppError> {
	let Some(expected_hex) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
		warn!("webhook signature is missing the sha256= prefix");
		return Err(GithubAppError::InvalidWebhookSignature);
	};

	let Ok(expected) = hex::decode(expected_hex) else {
		warn!("webhook signature is not valid hex");
		return Err(GithubAppError::InvalidWebhookSignature);
	};

	let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
	mac.update(body);

	if mac.verify_slice(&expected).is_ok() {
		debug!("webhook signature verified");
		Ok(())
	} else {
		warn!("webhook signature mismatch");
		Err(GithubAppError::InvalidWebhookSignature)
	}
}

/// `sha256=<hex>` header value for a body. Used by tests and delivery tooling.
pub fn compute_webhook_signature(secret: &[u8], body: &[u8]) -> String {
	format!("{SIGNATURE_PREFIX}{}", hmac_sha256_hex(secret, body))
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn known_vector() {
		// RFC 4231 test case 2
		assert_eq!(
			hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?"),
			"5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
		);
	}

	#[test]
	fn rejects_missing_prefix() {
		let sig = hmac_sha256_hex(b"secret", b"{}");
		assert!(matches!(
			verify_webhook_signature(b"secret", &sig, b"{}"),
			Err(GithubAppError::InvalidWebhookSignature)
		));
	}

	#[test]
	fn rejects_non_hex() {
		assert!(verify_webhook_signature(b"secret", "sha256=zzzz", b"{}").is_err());
	}

	proptest! {
		#[test]
		fn computed_signature_verifies(
			secret in proptest::collection::vec(any::<u8>(), 1..64),
			body in proptest::collection::vec(any::<u8>(), 0..512),
		) {
			let header = compute_webhook_signature(&secret, &body);
			prop_assert!(verify_webhook_signature(&secret, &header, &body).is_ok());
		}

		#[test]
		fn tampered_body_fails(
			body in proptest::collection::vec(any::<u8>(), 1..256),
			flip in any::<prop::sample::Index>(),
		) {
			let header = compute_webhook_signature(b"whsec", &body);
			let mut tampered = body.clone();
			let i = flip.index(tampered.len());
			tampered[i] ^= 0x01;
			prop_assert!(verify_webhook_signature(b"whsec", &header, &tampered).is_err());
		}

		#[test]
		fn wrong_secret_fails(body in proptest::collection::vec(any::<u8>(), 0..256)) {
			let header = compute_webhook_signature(b"right", &body);
			prop_assert!(verify_webhook_signature(b"wrong", &header, &body).is_err());
		}
	}
}

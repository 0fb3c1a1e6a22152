// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! App assertions: short-lived RS256 JWTs that identify the GitHub App itself.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use kiln_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::GithubAppError;

/// Backdate `iat` to tolerate clock drift between us and GitHub.
pub const ASSERTION_SKEW_SECS: i64 = 30;
pub const ASSERTION_LIFETIME_SECS: i64 = 120;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
	pub iat: i64,
	pub exp: i64,
	pub iss: String,
}

/// Produces app assertions for the token-exchange endpoint.
pub trait AppSigner: Send + Sync {
	fn app_id(&self) -> u64;

	fn sign(&self) -> Result<SecretString, GithubAppError>;
}

/// Signs assertions with the app's PEM-encoded RSA private key.
#[derive(Clone)]
pub struct RsaAppSigner {
	app_id: u64,
	key: EncodingKey,
}

impl std::fmt::Debug for RsaAppSigner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RsaAppSigner")
			.field("app_id", &self.app_id)
			.finish_non_exhaustive()
	}
}

impl RsaAppSigner {
	pub fn from_pem(app_id: u64, private_key_pem: &SecretString) -> Result<Self, GithubAppError> {
		if private_key_pem.is_blank() {
			return Err(GithubAppError::Signing(
				"app private key is not configured".to_string(),
			));
		}

		let key = EncodingKey::from_rsa_pem(private_key_pem.expose().as_bytes())
			.map_err(|e| GithubAppError::Signing(format!("invalid RSA private key: {e}")))?;

		Ok(Self { app_id, key })
	}
}

impl AppSigner for RsaAppSigner {
	fn app_id(&self) -> u64 {
		self.app_id
	}

	#[instrument(skip(self), fields(app_id = self.app_id))]
	fn sign(&self) -> Result<SecretString, GithubAppError> {
		let now = Utc::now().timestamp();
		let claims = Claims {
			iat: now - ASSERTION_SKEW_SECS,
			exp: now + ASSERTION_LIFETIME_SECS,
			iss: self.app_id.to_string(),
		};

		let token = encode(&Header::new(Algorithm::RS256), &claims, &self.key)
			.map_err(|e| GithubAppError::Signing(format!("failed to encode assertion: {e}")))?;

		debug!(exp = claims.exp, "signed app assertion");
		Ok(SecretString::new(token))
	}
}

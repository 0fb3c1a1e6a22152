// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Credential selection for outbound GitHub calls.
//!
//! A repository linked to an installation is served by that installation's
//! [`InstallationTransport`]. Unlinked repositories, deployments without an
//! app, and installations the app can no longer act on fall back to the
//! repository owner's legacy OAuth token. Every fallback is logged.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use kiln_common_secret::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cache::{CacheError, InstallTokenCache};
use crate::client::GithubAppClient;
use crate::error::GithubAppError;
use crate::transport::InstallationTransport;
use crate::types::InstallationToken;

/// The bearer a caller should use, and which principal it belongs to.
#[derive(Debug, Clone)]
pub enum ScmCredential {
	Installation {
		installation_id: i64,
		token: SecretString,
	},
	Legacy {
		token: SecretString,
	},
}

impl ScmCredential {
	pub fn token(&self) -> &SecretString {
		match self {
			Self::Installation { token, .. } | Self::Legacy { token } => token,
		}
	}

	pub fn is_installation(&self) -> bool {
		matches!(self, Self::Installation { .. })
	}
}

pub struct CredentialManager {
	app: Option<Arc<GithubAppClient>>,
	cache: Arc<InstallTokenCache>,
	legacy_fallback: bool,
	transports: Mutex<HashMap<i64, Arc<InstallationTransport>>>,
}

impl std::fmt::Debug for CredentialManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CredentialManager")
			.field("app_configured", &self.app.is_some())
			.field("legacy_fallback", &self.legacy_fallback)
			.finish_non_exhaustive()
	}
}

impl CredentialManager {
	/// `app` is `None` when no GitHub App is configured.
	pub fn new(app: Option<Arc<GithubAppClient>>, cache: Arc<InstallTokenCache>) -> Self {
		Self {
			app,
			cache,
			legacy_fallback: true,
			transports: Mutex::new(HashMap::new()),
		}
	}

	pub fn with_legacy_fallback(mut self, enabled: bool) -> Self {
		self.legacy_fallback = enabled;
		self
	}

	pub fn app(&self) -> Option<&Arc<GithubAppClient>> {
		self.app.as_ref()
	}

	pub fn cache(&self) -> &Arc<InstallTokenCache> {
		&self.cache
	}

	/// The shared transport for an installation, created on first use.
	pub fn transport(&self, installation_id: i64) -> Option<Arc<InstallationTransport>> {
		let app = self.app.as_ref()?;
		let mut transports = self.transports.lock().unwrap_or_else(PoisonError::into_inner);
		let transport = transports.entry(installation_id).or_insert_with(|| {
			Arc::new(InstallationTransport::new(
				app.clone(),
				installation_id,
				Vec::new(),
				app.config().permissions().clone(),
			))
		});
		Some(transport.clone())
	}

	/// Pick the credential for acting on `repo`.
	#[instrument(skip(self, legacy_token, cancel))]
	pub async fn credential_for_repo(
		&self,
		repo: &str,
		installation_id: i64,
		legacy_token: Option<&SecretString>,
		cancel: &CancellationToken,
	) -> Result<ScmCredential, GithubAppError> {
		let transport = if installation_id == 0 {
			None
		} else {
			self.transport(installation_id)
		};

		let Some(transport) = transport else {
			info!("repository has no app installation, using legacy credential");
			return Self::legacy(repo, legacy_token);
		};

		match transport.token(cancel).await {
			Ok(token) => Ok(ScmCredential::Installation {
				installation_id,
				token,
			}),
			Err(e) if self.legacy_fallback && legacy_token.is_some() && e.is_installation_missing() => {
				warn!(error = %e, "app cannot act on repository, falling back to legacy credential");
				Self::legacy(repo, legacy_token)
			}
			Err(e) => Err(e),
		}
	}

	fn legacy(repo: &str, legacy_token: Option<&SecretString>) -> Result<ScmCredential, GithubAppError> {
		match legacy_token {
			Some(token) if !token.is_blank() => Ok(ScmCredential::Legacy {
				token: token.clone(),
			}),
			_ => Err(GithubAppError::NoCredential {
				repo: repo.to_string(),
			}),
		}
	}

	/// Mint a token scoped to `repositories` for one build and remember it
	/// for `repo_timeout_minutes` so workers can present it back.
	#[instrument(skip(self, permissions, cancel))]
	pub async fn new_build_token(
		&self,
		installation_id: i64,
		repositories: &[String],
		permissions: &BTreeMap<String, String>,
		repo_timeout_minutes: u64,
		cancel: &CancellationToken,
	) -> Result<InstallationToken, GithubAppError> {
		let app = self.app.as_ref().ok_or_else(|| {
			GithubAppError::Config("GitHub App is not configured".to_string())
		})?;

		let token = app
			.exchange_installation_token(installation_id, repositories, permissions, cancel)
			.await?;
		self.cache.put(&token, repo_timeout_minutes).await?;

		info!(expires_at = %token.expires_at, "issued build token");
		Ok(token)
	}

	pub async fn validate_build_token(
		&self,
		token: &SecretString,
	) -> Result<InstallationToken, CacheError> {
		self.cache.get(token).await
	}

	pub async fn revoke_build_token(&self, token: &SecretString) -> Result<(), CacheError> {
		self.cache.evict(token).await
	}
}

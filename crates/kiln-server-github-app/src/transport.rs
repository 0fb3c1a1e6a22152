// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Per-installation token holder.
//!
//! Readers of a fresh token only take a short read lock. Refresh is
//! serialized by a per-installation async mutex and re-checks freshness after
//! acquiring it, so N concurrent callers against a stale token produce one
//! exchange. The stored value is swapped whole; a failed refresh leaves the
//! previous token in place.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Duration, Utc};
use kiln_common_secret::SecretString;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, trace};

use crate::client::GithubAppClient;
use crate::error::GithubAppError;
use crate::types::InstallationToken;

/// Tokens are renewed once they are within this window of expiry.
pub const REFRESH_MARGIN_SECS: i64 = 60;

pub struct InstallationTransport {
	installation_id: i64,
	repositories: Vec<String>,
	permissions: BTreeMap<String, String>,
	client: Arc<GithubAppClient>,
	current: RwLock<Option<Arc<InstallationToken>>>,
	refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for InstallationTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InstallationTransport")
			.field("installation_id", &self.installation_id)
			.field("repositories", &self.repositories)
			.finish_non_exhaustive()
	}
}

impl InstallationTransport {
	pub fn new(
		client: Arc<GithubAppClient>,
		installation_id: i64,
		repositories: Vec<String>,
		permissions: BTreeMap<String, String>,
	) -> Self {
		Self {
			installation_id,
			repositories,
			permissions,
			client,
			current: RwLock::new(None),
			refresh_lock: Mutex::new(()),
		}
	}

	pub fn installation_id(&self) -> i64 {
		self.installation_id
	}

	/// The last token obtained, fresh or not.
	pub fn current(&self) -> Option<Arc<InstallationToken>> {
		self
			.current
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	fn fresh(&self) -> Option<Arc<InstallationToken>> {
		self
			.current()
			.filter(|token| token.is_fresh(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS)))
	}

	fn store(&self, token: Arc<InstallationToken>) {
		*self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
	}

	/// A token valid for at least [`REFRESH_MARGIN_SECS`] more seconds.
	#[instrument(skip(self, cancel), fields(installation_id = self.installation_id))]
	pub async fn token(&self, cancel: &CancellationToken) -> Result<SecretString, GithubAppError> {
		if let Some(token) = self.fresh() {
			trace!("using cached installation token");
			return Ok(token.token.clone());
		}

		let _guard = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(GithubAppError::Cancelled),
			guard = self.refresh_lock.lock() => guard,
		};

		if let Some(token) = self.fresh() {
			trace!("using installation token refreshed by a concurrent caller");
			return Ok(token.token.clone());
		}

		let refreshed = self
			.client
			.exchange_installation_token(
				self.installation_id,
				&self.repositories,
				&self.permissions,
				cancel,
			)
			.await
			.map_err(|e| match e {
				GithubAppError::Cancelled => GithubAppError::Cancelled,
				other => GithubAppError::Refresh {
					installation_id: self.installation_id,
					source: Box::new(other),
				},
			})?;

		info!(expires_at = %refreshed.expires_at, "installation token refreshed");
		let token = refreshed.token.clone();
		self.store(Arc::new(refreshed));
		Ok(token)
	}
}

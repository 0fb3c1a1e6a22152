// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Install token cache.
//!
//! Build tokens are stored under `install_token:<hex HMAC-SHA256(server key, token)>`
//! with only their metadata as the value, so neither the key nor the value
//! reveals the token. Check-run ids live under `check_run:<build-id>` and
//! `step_check_run:<step-id>`. Values are JSON. TTLs are set on write and
//! never extended by reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use kiln_common_secret::SecretString;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::signature::hmac_sha256_hex;
use crate::types::{CheckRunRef, InstallationToken, TokenMetadata};

pub const INSTALL_TOKEN_PREFIX: &str = "install_token:";
pub const CHECK_RUN_PREFIX: &str = "check_run:";
pub const STEP_CHECK_RUN_PREFIX: &str = "step_check_run:";

/// Added on top of approval and build timeouts before check-run ids expire.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum CacheError {
	#[error("cache backend error: {0}")]
	Backend(String),

	#[error("cache serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("no cache entry for {0}")]
	NotFound(String),
}

/// Minimal key/value operations the cache needs from a shared store such as Redis.
#[async_trait]
pub trait CacheBackend: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

	async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

	/// Atomically fetch and delete.
	async fn get_del(&self, key: &str) -> Result<Option<String>, CacheError>;

	async fn del(&self, key: &str) -> Result<(), CacheError>;
}

/// Process-local backend. Expired entries are dropped when next touched and
/// swept on every write, so keys that are never read again do not pile up.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
	entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCacheBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		let now = Instant::now();
		let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
		entries.values().filter(|(_, expires)| *expires > now).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn keys(&self) -> Vec<String> {
		let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
		entries.keys().cloned().collect()
	}

	fn take(&self, key: &str, remove: bool) -> Option<String> {
		let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
		let expired = match entries.get(key) {
			Some((_, expires)) => *expires <= Instant::now(),
			None => return None,
		};

		if expired || remove {
			return entries.remove(key).filter(|_| !expired).map(|(value, _)| value);
		}

		entries.get(key).map(|(value, _)| value.clone())
	}
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
	async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
		Ok(self.take(key, false))
	}

	async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
		let now = Instant::now();
		let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
		entries.retain(|_, (_, expires)| *expires > now);
		entries.insert(key.to_string(), (value, now + ttl));
		Ok(())
	}

	async fn get_del(&self, key: &str) -> Result<Option<String>, CacheError> {
		Ok(self.take(key, true))
	}

	async fn del(&self, key: &str) -> Result<(), CacheError> {
		let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
		entries.remove(key);
		Ok(())
	}
}

/// Which check-run set a cache entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckRunTarget {
	Build(i64),
	Step(i64),
}

impl CheckRunTarget {
	pub fn key(&self) -> String {
		match self {
			Self::Build(id) => format!("{CHECK_RUN_PREFIX}{id}"),
			Self::Step(id) => format!("{STEP_CHECK_RUN_PREFIX}{id}"),
		}
	}
}

pub struct InstallTokenCache {
	backend: Arc<dyn CacheBackend>,
	key: SecretString,
	approval_timeout: Duration,
	grace: Duration,
}

impl std::fmt::Debug for InstallTokenCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InstallTokenCache")
			.field("key", &self.key)
			.field("approval_timeout", &self.approval_timeout)
			.field("grace", &self.grace)
			.finish_non_exhaustive()
	}
}

impl InstallTokenCache {
	pub fn new(backend: Arc<dyn CacheBackend>, key: SecretString) -> Self {
		Self {
			backend,
			key,
			approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
			grace: DEFAULT_GRACE,
		}
	}

	pub fn with_timeouts(mut self, approval_timeout: Duration, grace: Duration) -> Self {
		self.approval_timeout = approval_timeout;
		self.grace = grace;
		self
	}

	/// Cache key for a token. One-way: derived with the server key.
	pub fn token_key(&self, token: &str) -> String {
		format!(
			"{INSTALL_TOKEN_PREFIX}{}",
			hmac_sha256_hex(self.key.expose().as_bytes(), token.as_bytes())
		)
	}

	/// Store a token's metadata for `repo_timeout_minutes`, never past the
	/// token's own expiry. Already-expired tokens are not stored.
	#[instrument(skip(self, token), fields(installation_id = token.installation_id))]
	pub async fn put(
		&self,
		token: &InstallationToken,
		repo_timeout_minutes: u64,
	) -> Result<(), CacheError> {
		let remaining = (token.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
		let ttl = Duration::from_secs(repo_timeout_minutes.saturating_mul(60)).min(remaining);
		if ttl.is_zero() {
			debug!("token already expired, not caching");
			return Ok(());
		}

		let value = serde_json::to_string(&token.metadata())?;
		self
			.backend
			.set(&self.token_key(token.token.expose()), value, ttl)
			.await?;

		debug!(ttl_secs = ttl.as_secs(), "cached install token metadata");
		Ok(())
	}

	/// Look a token up and reattach it to its cached metadata.
	pub async fn get(&self, token: &SecretString) -> Result<InstallationToken, CacheError> {
		let key = self.token_key(token.expose());
		let value = self
			.backend
			.get(&key)
			.await?
			.ok_or_else(|| CacheError::NotFound(key.clone()))?;

		let metadata: TokenMetadata = serde_json::from_str(&value)?;
		Ok(metadata.into_token(token.clone()))
	}

	pub async fn evict(&self, token: &SecretString) -> Result<(), CacheError> {
		self.backend.del(&self.token_key(token.expose())).await
	}

	/// How long check-run ids stay cached for a build whose repository
	/// timeout is `build_timeout_minutes`.
	pub fn check_run_ttl(&self, build_timeout_minutes: u64) -> Duration {
		self.approval_timeout
			+ Duration::from_secs(build_timeout_minutes.saturating_mul(60))
			+ self.grace
	}

	/// How long check-run ids outlive a terminal report.
	pub fn grace(&self) -> Duration {
		self.grace
	}

	#[instrument(skip(self, runs), fields(count = runs.len()))]
	pub async fn put_check_runs(
		&self,
		target: CheckRunTarget,
		runs: &[CheckRunRef],
		ttl: Duration,
	) -> Result<(), CacheError> {
		let value = serde_json::to_string(runs)?;
		self.backend.set(&target.key(), value, ttl).await
	}

	/// Check runs recorded for `target`. Reading a finished target deletes the
	/// entry. A miss is an empty list.
	#[instrument(skip(self))]
	pub async fn get_check_runs(
		&self,
		target: CheckRunTarget,
		finished: bool,
	) -> Result<Vec<CheckRunRef>, CacheError> {
		let key = target.key();
		let value = if finished {
			self.backend.get_del(&key).await?
		} else {
			self.backend.get(&key).await?
		};

		match value {
			Some(value) => Ok(serde_json::from_str(&value)?),
			None => {
				debug!("no cached check runs");
				Ok(Vec::new())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::collections::BTreeMap;

	fn cache_with(backend: Arc<MemoryCacheBackend>, key: &str) -> InstallTokenCache {
		InstallTokenCache::new(backend, SecretString::from(key))
	}

	fn token(value: &str, expires_in: chrono::Duration) -> InstallationToken {
		InstallationToken {
			token: SecretString::from(value),
			installation_id: 31,
			repositories: vec!["widgets".to_string()],
			permissions: BTreeMap::from([("contents".to_string(), "read".to_string())]),
			expires_at: Utc::now() + expires_in,
		}
	}

	fn run(id: i64, context: &str) -> CheckRunRef {
		CheckRunRef {
			id,
			context: context.to_string(),
			repo: "octo/widgets".to_string(),
			build_number: 4,
		}
	}

	#[tokio::test]
	async fn put_get_reattaches_token_without_storing_it() {
		let backend = Arc::new(MemoryCacheBackend::new());
		let cache = cache_with(backend.clone(), "server-key");
		let original = token("ghs_build_token", chrono::Duration::hours(1));

		cache.put(&original, 30).await.unwrap();

		let keys = backend.keys();
		assert_eq!(keys.len(), 1);
		assert!(keys[0].starts_with(INSTALL_TOKEN_PREFIX));
		assert!(!keys[0].contains("ghs_build_token"));
		let stored = backend.get(&keys[0]).await.unwrap().unwrap();
		assert!(!stored.contains("ghs_build_token"));

		let fetched = cache.get(&SecretString::from("ghs_build_token")).await.unwrap();
		assert_eq!(fetched.token.expose(), "ghs_build_token");
		assert_eq!(fetched.installation_id, 31);
		assert_eq!(fetched.repositories, original.repositories);
		assert_eq!(fetched.permissions, original.permissions);
	}

	#[tokio::test]
	async fn unknown_token_is_not_found_and_evict_removes() {
		let backend = Arc::new(MemoryCacheBackend::new());
		let cache = cache_with(backend.clone(), "server-key");
		let original = token("ghs_evict_me", chrono::Duration::hours(1));

		assert!(matches!(
			cache.get(&original.token).await,
			Err(CacheError::NotFound(_))
		));

		cache.put(&original, 30).await.unwrap();
		cache.evict(&original.token).await.unwrap();
		assert!(backend.is_empty());
	}

	#[tokio::test]
	async fn expired_token_is_not_cached() {
		let backend = Arc::new(MemoryCacheBackend::new());
		let cache = cache_with(backend.clone(), "server-key");

		cache
			.put(&token("ghs_old", chrono::Duration::seconds(-5)), 30)
			.await
			.unwrap();
		assert!(backend.is_empty());
	}

	#[tokio::test]
	async fn check_runs_survive_until_finished() {
		let backend = Arc::new(MemoryCacheBackend::new());
		let cache = cache_with(backend.clone(), "server-key");
		let target = CheckRunTarget::Build(88);
		let runs = vec![run(1, "kiln/pull_request"), run(2, "kiln/push")];

		assert!(cache.get_check_runs(target, false).await.unwrap().is_empty());

		cache
			.put_check_runs(target, &runs, Duration::from_secs(60))
			.await
			.unwrap();
		assert_eq!(cache.get_check_runs(target, false).await.unwrap(), runs);
		assert_eq!(cache.get_check_runs(target, false).await.unwrap(), runs);

		assert_eq!(cache.get_check_runs(target, true).await.unwrap(), runs);
		assert!(cache.get_check_runs(target, false).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn memory_backend_expires_entries() {
		let backend = MemoryCacheBackend::new();
		backend
			.set("k", "v".to_string(), Duration::from_millis(10))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(30)).await;
		assert!(backend.get("k").await.unwrap().is_none());
		assert!(backend.get_del("k").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn writes_sweep_expired_entries() {
		let backend = MemoryCacheBackend::new();
		for i in 0..50 {
			backend
				.set(&format!("{CHECK_RUN_PREFIX}{i}"), "[]".to_string(), Duration::from_millis(10))
				.await
				.unwrap();
		}
		assert_eq!(backend.keys().len(), 50);

		tokio::time::sleep(Duration::from_millis(30)).await;
		backend
			.set("live", "v".to_string(), Duration::from_secs(60))
			.await
			.unwrap();
		assert_eq!(backend.keys(), vec!["live".to_string()]);
	}

	#[test]
	fn key_layout() {
		assert_eq!(CheckRunTarget::Build(12).key(), "check_run:12");
		assert_eq!(CheckRunTarget::Step(9).key(), "step_check_run:9");

		let cache = cache_with(Arc::new(MemoryCacheBackend::new()), "k");
		let key = cache.token_key("t");
		assert_eq!(key.len(), INSTALL_TOKEN_PREFIX.len() + 64);
	}

	#[test]
	fn check_run_ttl_adds_grace() {
		let cache = cache_with(Arc::new(MemoryCacheBackend::new()), "k")
			.with_timeouts(Duration::from_secs(600), Duration::from_secs(300));
		assert_eq!(cache.check_run_ttl(30), Duration::from_secs(600 + 1800 + 300));
	}

	proptest! {
		#[test]
		fn token_key_is_not_the_token(
			token in "[A-Za-z0-9_]{8,64}",
			key_a in "[a-z]{8,32}",
			key_b in "[a-z]{8,32}",
		) {
			prop_assume!(key_a != key_b);
			let a = cache_with(Arc::new(MemoryCacheBackend::new()), &key_a);
			let b = cache_with(Arc::new(MemoryCacheBackend::new()), &key_b);

			let key = a.token_key(&token);
			prop_assert!(!key.contains(&token));
			prop_assert_ne!(key, b.token_key(&token));
		}
	}
}

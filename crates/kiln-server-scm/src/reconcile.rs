// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Applies installation events to stored repositories.
//!
//! Every repository named by the event is linked to (or unlinked from) the
//! installation and gets an audit hook. Repositories that were never
//! onboarded are skipped. Each repository is retried on its own with linear
//! backoff, and one failing repository never stops the others.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ReconcileError, RepoFailure, StoreError};
use crate::store::{HookRecord, ScmStore, StoredRepo};
use crate::types::{actions, Hook, Installation};
use crate::webhook::hook_link;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

pub struct InstallationReconciler {
	store: Arc<dyn ScmStore>,
	max_attempts: u32,
	backoff: Duration,
}

impl std::fmt::Debug for InstallationReconciler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InstallationReconciler")
			.field("max_attempts", &self.max_attempts)
			.field("backoff", &self.backoff)
			.finish_non_exhaustive()
	}
}

enum Outcome {
	Updated,
	Skipped,
}

enum SyncError {
	Store(StoreError),
	Cancelled,
}

impl InstallationReconciler {
	pub fn new(store: Arc<dyn ScmStore>) -> Self {
		Self {
			store,
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			backoff: DEFAULT_BACKOFF,
		}
	}

	/// Attempt `n` (from 1) waits `(n - 1) * backoff` before running.
	pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
		self.max_attempts = max_attempts.max(1);
		self.backoff = backoff;
		self
	}

	/// Link the added repositories to the installation and unlink the
	/// removed ones. Returns how many repositories were updated.
	#[instrument(
		skip(self, hook, installation, cancel),
		fields(
			installation_id = installation.id,
			action = %installation.action,
			org = %installation.org,
		)
	)]
	pub async fn apply(
		&self,
		hook: &Hook,
		installation: &Installation,
		cancel: &CancellationToken,
	) -> Result<usize, ReconcileError> {
		// A deleted installation unlinks even the repositories it lists as added.
		let added_id = if installation.action == actions::DELETED {
			0
		} else {
			installation.id
		};

		let targets = installation
			.repositories_added
			.iter()
			.map(|name| (name, added_id))
			.chain(installation.repositories_removed.iter().map(|name| (name, 0)));

		let mut updated = 0;
		let mut failures = Vec::new();

		for (name, install_id) in targets {
			if cancel.is_cancelled() {
				return Err(ReconcileError::Cancelled);
			}

			match self
				.sync_repo(hook, &installation.org, name, install_id, cancel)
				.await
			{
				Ok(Outcome::Updated) => updated += 1,
				Ok(Outcome::Skipped) => {}
				Err(SyncError::Store(error)) => {
					error!(repo = %name, error = %error, "failed to reconcile repository");
					failures.push(RepoFailure {
						repo: format!("{}/{}", installation.org, name),
						error,
					});
				}
				Err(SyncError::Cancelled) => return Err(ReconcileError::Cancelled),
			}
		}

		if failures.is_empty() {
			info!(updated, "installation reconciled");
			Ok(updated)
		} else {
			Err(ReconcileError::Partial { failures })
		}
	}

	async fn sync_repo(
		&self,
		hook: &Hook,
		org: &str,
		name: &str,
		install_id: i64,
		cancel: &CancellationToken,
	) -> Result<Outcome, SyncError> {
		let mut stored = match self.store.get_repo_for_org(org, name).await {
			Ok(stored) => stored,
			Err(e) if e.is_not_found() => {
				debug!(repo = %name, "repository not onboarded, skipping");
				return Ok(Outcome::Skipped);
			}
			Err(e) => return Err(SyncError::Store(e)),
		};
		stored.repo.install_id = install_id;

		let mut hook_created = false;
		let mut attempt: u32 = 0;

		loop {
			attempt += 1;
			if attempt > 1 {
				let delay = self.backoff * (attempt - 1);
				tokio::select! {
					biased;
					_ = cancel.cancelled() => return Err(SyncError::Cancelled),
					_ = tokio::time::sleep(delay) => {}
				}
			}

			let result = if hook_created {
				self.store.update_repo(&stored).await.map(|_| ())
			} else {
				match self.record_hook(hook, &stored).await {
					Ok(()) => {
						hook_created = true;
						self.store.update_repo(&stored).await.map(|_| ())
					}
					Err(e) => Err(e),
				}
			};

			match result {
				Ok(()) => {
					info!(repo = %stored.repo.full_name, install_id, "repository installation updated");
					return Ok(Outcome::Updated);
				}
				Err(e) if attempt >= self.max_attempts => return Err(SyncError::Store(e)),
				Err(e) => {
					warn!(
						repo = %stored.repo.full_name,
						attempt,
						max_attempts = self.max_attempts,
						error = %e,
						"repository update failed, retrying"
					);
				}
			}
		}
	}

	async fn record_hook(&self, hook: &Hook, stored: &StoredRepo) -> Result<(), StoreError> {
		let number = self
			.store
			.last_hook_for_repo(stored.id)
			.await?
			.map(|last| last.hook.number + 1)
			.unwrap_or(1);

		let mut hook = hook.clone();
		hook.number = number;
		hook.link = hook_link(&hook.host, &stored.repo.full_name);
		hook.branch = stored.repo.branch.clone();

		self
			.store
			.create_hook(&HookRecord {
				repo_id: stored.id,
				hook,
			})
			.await
			.map(|_| ())
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Persistence seam for the SCM layer.
//!
//! The server's database implements [`ScmStore`]. [`MemoryScmStore`] backs
//! tests and single-process runs.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Hook, Repo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRepo {
	pub id: i64,
	pub repo: Repo,
}

/// A persisted delivery. `hook.number` is unique per repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRecord {
	pub repo_id: i64,
	pub hook: Hook,
}

#[async_trait]
pub trait ScmStore: Send + Sync {
	/// [`StoreError::NotFound`] when the repository has not been onboarded.
	async fn get_repo_for_org(&self, org: &str, name: &str) -> Result<StoredRepo, StoreError>;
	async fn update_repo(&self, repo: &StoredRepo) -> Result<StoredRepo, StoreError>;
	async fn last_hook_for_repo(&self, repo_id: i64) -> Result<Option<HookRecord>, StoreError>;
	/// [`StoreError::Conflict`] when the hook number is already taken.
	async fn create_hook(&self, record: &HookRecord) -> Result<HookRecord, StoreError>;
}

#[derive(Default)]
struct MemoryState {
	next_id: i64,
	repos: HashMap<i64, StoredRepo>,
	hooks: Vec<HookRecord>,
}

#[derive(Default)]
pub struct MemoryScmStore {
	state: Mutex<MemoryState>,
}

impl MemoryScmStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub fn insert_repo(&self, repo: Repo) -> StoredRepo {
		let mut state = self.state();
		state.next_id += 1;
		let stored = StoredRepo {
			id: state.next_id,
			repo,
		};
		state.repos.insert(stored.id, stored.clone());
		stored
	}

	pub fn repo(&self, full_name: &str) -> Option<StoredRepo> {
		self
			.state()
			.repos
			.values()
			.find(|r| r.repo.full_name == full_name)
			.cloned()
	}

	pub fn hooks_for_repo(&self, repo_id: i64) -> Vec<HookRecord> {
		let mut hooks: Vec<_> = self
			.state()
			.hooks
			.iter()
			.filter(|h| h.repo_id == repo_id)
			.cloned()
			.collect();
		hooks.sort_by_key(|h| h.hook.number);
		hooks
	}
}

#[async_trait]
impl ScmStore for MemoryScmStore {
	async fn get_repo_for_org(&self, org: &str, name: &str) -> Result<StoredRepo, StoreError> {
		self
			.state()
			.repos
			.values()
			.find(|r| r.repo.org.eq_ignore_ascii_case(org) && r.repo.name.eq_ignore_ascii_case(name))
			.cloned()
			.ok_or_else(|| StoreError::NotFound(format!("{org}/{name}")))
	}

	async fn update_repo(&self, repo: &StoredRepo) -> Result<StoredRepo, StoreError> {
		let mut state = self.state();
		match state.repos.get_mut(&repo.id) {
			Some(existing) => {
				*existing = repo.clone();
				Ok(repo.clone())
			}
			None => Err(StoreError::NotFound(format!("repo {}", repo.id))),
		}
	}

	async fn last_hook_for_repo(&self, repo_id: i64) -> Result<Option<HookRecord>, StoreError> {
		Ok(self
			.state()
			.hooks
			.iter()
			.filter(|h| h.repo_id == repo_id)
			.max_by_key(|h| h.hook.number)
			.cloned())
	}

	async fn create_hook(&self, record: &HookRecord) -> Result<HookRecord, StoreError> {
		let mut state = self.state();
		if state
			.hooks
			.iter()
			.any(|h| h.repo_id == record.repo_id && h.hook.number == record.hook.number)
		{
			return Err(StoreError::Conflict(format!(
				"hook {} already exists for repo {}",
				record.hook.number, record.repo_id
			)));
		}
		state.hooks.push(record.clone());
		Ok(record.clone())
	}
}

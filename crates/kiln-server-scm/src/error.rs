// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use kiln_server_github_app::{CacheError, GithubAppError};
use thiserror::Error;

/// Errors from the persistence layer behind [`crate::store::ScmStore`].
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("store error: {0}")]
	Internal(String),
}

impl StoreError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, StoreError::NotFound(_))
	}
}

#[derive(Debug)]
pub struct RepoFailure {
	pub repo: String,
	pub error: StoreError,
}

impl std::fmt::Display for RepoFailure {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.repo, self.error)
	}
}

fn summarize(failures: &[RepoFailure]) -> String {
	failures
		.iter()
		.map(ToString::to_string)
		.collect::<Vec<_>>()
		.join("; ")
}

#[derive(Debug, Error)]
pub enum ReconcileError {
	/// Some repositories could not be updated. The rest were.
	#[error("failed to reconcile {count} repositories: {summary}", count = .failures.len(), summary = summarize(.failures))]
	Partial { failures: Vec<RepoFailure> },

	#[error("installation reconciliation cancelled")]
	Cancelled,
}

impl ReconcileError {
	pub fn failed_repos(&self) -> Vec<&str> {
		match self {
			ReconcileError::Partial { failures } => failures.iter().map(|f| f.repo.as_str()).collect(),
			ReconcileError::Cancelled => Vec::new(),
		}
	}
}

#[derive(Debug, Error)]
pub enum ReportError {
	#[error("unable to obtain credential: {0}")]
	Credential(#[source] GithubAppError),

	/// Posting one context failed; later contexts in the same call were not attempted.
	#[error("failed to report status for context {context}: {source}")]
	Post {
		context: String,
		#[source]
		source: GithubAppError,
	},

	#[error(transparent)]
	Cache(#[from] CacheError),

	#[error("status report cancelled")]
	Cancelled,
}

impl ReportError {
	pub(crate) fn from_credential(e: GithubAppError) -> Self {
		if e.is_cancelled() {
			ReportError::Cancelled
		} else {
			ReportError::Credential(e)
		}
	}

	pub(crate) fn from_post(context: &str, e: GithubAppError) -> Self {
		if e.is_cancelled() {
			ReportError::Cancelled
		} else {
			ReportError::Post {
				context: context.to_string(),
				source: e,
			}
		}
	}
}

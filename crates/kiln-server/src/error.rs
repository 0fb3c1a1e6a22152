// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use kiln_server_github_app::{CacheError, GithubAppError, OAuthError};
use kiln_server_scm::{ReconcileError, ReportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
	#[error("OAuth login is not configured")]
	OAuthNotConfigured,

	#[error(transparent)]
	GithubApp(#[from] GithubAppError),

	#[error(transparent)]
	OAuth(#[from] OAuthError),

	#[error(transparent)]
	Cache(#[from] CacheError),

	#[error(transparent)]
	Reconcile(#[from] ReconcileError),

	#[error(transparent)]
	Report(#[from] ReportError),
}

impl ServiceError {
	pub fn is_cancelled(&self) -> bool {
		match self {
			ServiceError::GithubApp(e) => e.is_cancelled(),
			ServiceError::Reconcile(ReconcileError::Cancelled) => true,
			ServiceError::Report(ReportError::Cancelled) => true,
			_ => false,
		}
	}
}

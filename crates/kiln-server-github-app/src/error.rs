// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for the GitHub App layer.

use thiserror::Error;

use crate::cache::CacheError;

/// Errors raised while obtaining credentials or calling the GitHub API.
#[derive(Debug, Error)]
pub enum GithubAppError {
	/// The app assertion could not be produced (missing or malformed key).
	#[error("failed to sign app assertion: {0}")]
	Signing(String),

	/// The token-exchange endpoint answered with a non-2xx status.
	#[error("installation token exchange failed for installation {installation_id}: {status} - {message}")]
	Exchange {
		installation_id: i64,
		status: u16,
		message: String,
	},

	/// Network-level failure talking to GitHub.
	#[error("transport error: {0}")]
	Transport(#[from] reqwest::Error),

	/// A cached installation token could not be renewed. The previous value is kept.
	#[error("failed to refresh token for installation {installation_id}: {source}")]
	Refresh {
		installation_id: i64,
		#[source]
		source: Box<GithubAppError>,
	},

	/// The caller's cancellation signal fired before the operation finished.
	#[error("operation cancelled")]
	Cancelled,

	#[error("unauthorized or invalid app configuration")]
	Unauthorized,

	#[error("forbidden or insufficient permissions")]
	Forbidden,

	#[error("rate limit exceeded")]
	RateLimited,

	#[error("resource not found: {0}")]
	NotFound(String),

	#[error("GitHub API error: {status} - {message}")]
	Api { status: u16, message: String },

	#[error("invalid response from GitHub: {0}")]
	InvalidResponse(String),

	#[error("configuration error: {0}")]
	Config(String),

	/// Neither an installation token nor a legacy token can serve the repository.
	#[error("no credential available for {repo}")]
	NoCredential { repo: String },

	#[error("delivery {guid} is no longer available to be redelivered")]
	RedeliveryUnavailable { guid: String },

	#[error("invalid webhook signature")]
	InvalidWebhookSignature,

	#[error(transparent)]
	Cache(#[from] CacheError),
}

impl GithubAppError {
	pub fn api_error(status: u16, message: impl Into<String>) -> Self {
		Self::Api {
			status,
			message: message.into(),
		}
	}

	/// True when the exchange failed because the app cannot act on the target
	/// (uninstalled, suspended, or the repository is outside the installation).
	/// These are the failures that permit the legacy credential fallback.
	pub fn is_installation_missing(&self) -> bool {
		match self {
			Self::Exchange { status, .. } => matches!(status, 403 | 404 | 422),
			Self::Refresh { source, .. } => source.is_installation_missing(),
			_ => false,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		match self {
			Self::Cancelled => true,
			Self::Refresh { source, .. } => source.is_cancelled(),
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn exchange(status: u16) -> GithubAppError {
		GithubAppError::Exchange {
			installation_id: 7,
			status,
			message: "nope".to_string(),
		}
	}

	#[test]
	fn missing_installation_statuses() {
		assert!(exchange(404).is_installation_missing());
		assert!(exchange(422).is_installation_missing());
		assert!(exchange(403).is_installation_missing());
		assert!(!exchange(500).is_installation_missing());
		assert!(!exchange(401).is_installation_missing());
	}

	#[test]
	fn refresh_looks_through_to_cause() {
		let err = GithubAppError::Refresh {
			installation_id: 7,
			source: Box::new(exchange(404)),
		};
		assert!(err.is_installation_missing());
		assert!(!err.is_cancelled());
		assert!(err.to_string().contains("installation 7"));
	}

	#[test]
	fn cancellation_is_distinct_from_provider_failure() {
		assert!(GithubAppError::Cancelled.is_cancelled());
		assert!(!GithubAppError::Cancelled.is_installation_missing());
		assert!(!GithubAppError::api_error(502, "bad gateway").is_cancelled());
	}

	#[test]
	fn redelivery_message() {
		let err = GithubAppError::RedeliveryUnavailable {
			guid: "abc-123".to_string(),
		};
		assert_eq!(
			err.to_string(),
			"delivery abc-123 is no longer available to be redelivered"
		);
	}
}

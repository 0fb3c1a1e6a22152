// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Request and response types for the GitHub endpoints Kiln calls.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use kiln_common_secret::SecretString;
use serde::{Deserialize, Serialize};

/// An installation-scoped access token and what it is allowed to touch.
#[derive(Debug, Clone)]
pub struct InstallationToken {
	pub token: SecretString,
	pub installation_id: i64,
	/// Empty means every repository in the installation.
	pub repositories: Vec<String>,
	pub permissions: BTreeMap<String, String>,
	pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
	/// Usable until `margin` before expiry.
	pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
		now < self.expires_at - margin
	}

	pub(crate) fn metadata(&self) -> TokenMetadata {
		TokenMetadata {
			installation_id: self.installation_id,
			repositories: self.repositories.clone(),
			permissions: self.permissions.clone(),
			expires_at: self.expires_at,
		}
	}
}

/// Everything about an [`InstallationToken`] except the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TokenMetadata {
	pub installation_id: i64,
	#[serde(default)]
	pub repositories: Vec<String>,
	#[serde(default)]
	pub permissions: BTreeMap<String, String>,
	pub expires_at: DateTime<Utc>,
}

impl TokenMetadata {
	pub(crate) fn into_token(self, token: SecretString) -> InstallationToken {
		InstallationToken {
			token,
			installation_id: self.installation_id,
			repositories: self.repositories,
			permissions: self.permissions,
			expires_at: self.expires_at,
		}
	}
}

/// A check run created for one status context of a build or step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRunRef {
	pub id: i64,
	pub context: String,
	pub repo: String,
	pub build_number: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct AccessTokenRequest {
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub repositories: Vec<String>,
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub permissions: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenResponse {
	pub token: String,
	pub expires_at: DateTime<Utc>,
	#[serde(default)]
	pub permissions: BTreeMap<String, String>,
	#[serde(default)]
	pub repositories: Vec<AccessTokenRepository>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenRepository {
	pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
	Pending,
	Success,
	Failure,
	Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitStatusRequest {
	pub state: CommitState,
	pub context: String,
	pub description: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub target_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunStatus {
	Queued,
	InProgress,
	Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunConclusion {
	Success,
	Failure,
	Cancelled,
	Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckRunOutput {
	pub title: String,
	pub summary: String,
}

/// Body for both creating (`name` and `head_sha` set) and updating a check run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckRunRequest {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub head_sha: Option<String>,
	pub status: CheckRunStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub conclusion: Option<CheckRunConclusion>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details_url: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub external_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub output: Option<CheckRunOutput>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckRunResponse {
	pub id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
	Queued,
	InProgress,
	Success,
	Failure,
	Error,
	Inactive,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStatusRequest {
	pub state: DeploymentState,
	pub description: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub log_url: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub environment: Option<String>,
}

/// One entry from `GET /repos/{owner}/{repo}/hooks/{hook_id}/deliveries`.
#[derive(Debug, Clone, Deserialize)]
pub struct HookDelivery {
	pub id: i64,
	pub guid: String,
	#[serde(default)]
	pub event: String,
	#[serde(default)]
	pub action: Option<String>,
	#[serde(default)]
	pub status_code: u16,
	#[serde(default)]
	pub redelivery: bool,
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Canonical event model produced by webhook normalization.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod events {
	pub const PUSH: &str = "push";
	pub const TAG: &str = "tag";
	pub const DELETE: &str = "delete";
	pub const PULL_REQUEST: &str = "pull_request";
	pub const DEPLOYMENT: &str = "deployment";
	pub const COMMENT: &str = "comment";
	pub const REPOSITORY: &str = "repository";
	pub const CUSTOM_PROPERTIES: &str = "custom_properties";
	pub const INSTALLATION: &str = "installation";
	pub const INSTALLATION_REPOSITORIES: &str = "installation_repositories";
	pub const MERGE_GROUP: &str = "merge_group";
}

pub mod actions {
	pub const BRANCH: &str = "branch";
	pub const TAG: &str = "tag";
	pub const CREATED: &str = "created";
	pub const DELETED: &str = "deleted";
	pub const ADDED: &str = "added";
	pub const REMOVED: &str = "removed";
	pub const OPENED: &str = "opened";
	pub const SYNCHRONIZE: &str = "synchronize";
	pub const REOPENED: &str = "reopened";
	pub const EDITED: &str = "edited";
	pub const LABELED: &str = "labeled";
	pub const UNLABELED: &str = "unlabeled";
	pub const CHECKS_REQUESTED: &str = "checks_requested";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookStatus {
	Success,
	Skipped,
	Error,
}

impl HookStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			HookStatus::Success => "success",
			HookStatus::Skipped => "skipped",
			HookStatus::Error => "error",
		}
	}
}

impl std::str::FromStr for HookStatus {
	type Err = ();
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"success" => Ok(HookStatus::Success),
			"skipped" => Ok(HookStatus::Skipped),
			"error" => Ok(HookStatus::Error),
			_ => Err(()),
		}
	}
}

/// One inbound delivery. Always present on a [`NormalizedEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
	/// Per-repository sequence number, assigned when the hook is persisted.
	pub number: i64,
	/// Provider delivery GUID (`X-GitHub-Delivery`).
	pub source_id: String,
	/// Provider webhook id (`X-GitHub-Hook-ID`).
	pub webhook_id: i64,
	pub event: String,
	pub event_action: String,
	pub created: DateTime<Utc>,
	pub host: String,
	pub status: HookStatus,
	pub error: String,
	pub link: String,
	pub branch: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
	pub org: String,
	pub name: String,
	pub full_name: String,
	pub link: String,
	pub clone: String,
	pub branch: String,
	pub private: bool,
	pub topics: BTreeSet<String>,
	pub custom_properties: BTreeMap<String, serde_json::Value>,
	/// 0 when the repository is not linked to an app installation.
	pub install_id: i64,
	pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
	pub event: String,
	pub event_action: String,
	pub commit: String,
	#[serde(rename = "ref")]
	pub git_ref: String,
	pub base_ref: String,
	pub head_ref: String,
	pub branch: String,
	pub sender: String,
	pub sender_scm_id: String,
	pub author: String,
	pub email: String,
	pub clone: String,
	pub source: String,
	pub title: String,
	pub message: String,
	pub fork: bool,
	pub deploy: String,
	pub deploy_number: i64,
	pub deploy_payload: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
	pub number: i64,
	pub url: String,
	pub commit: String,
	#[serde(rename = "ref")]
	pub git_ref: String,
	pub task: String,
	pub target: String,
	pub description: String,
	pub payload: BTreeMap<String, String>,
	pub created_at: i64,
	pub created_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
	pub number: i64,
	pub comment: String,
	pub labels: Vec<String>,
	pub is_from_fork: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
	pub action: String,
	pub id: i64,
	pub org: String,
	pub repositories_added: Vec<String>,
	pub repositories_removed: Vec<String>,
}

/// Result of normalizing one webhook delivery.
///
/// Besides `hook`, at most one result set is populated: a build (with its
/// pull request or deployment), a repository, or an installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
	pub hook: Hook,
	pub repo: Option<Repo>,
	pub build: Option<Build>,
	pub deployment: Option<Deployment>,
	pub pull_request: Option<PullRequest>,
	pub installation: Option<Installation>,
}

impl NormalizedEvent {
	pub fn hook_only(hook: Hook) -> Self {
		Self {
			hook,
			repo: None,
			build: None,
			deployment: None,
			pull_request: None,
			installation: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hook_status_round_trips_through_str() {
		for status in [HookStatus::Success, HookStatus::Skipped, HookStatus::Error] {
			assert_eq!(status.as_str().parse::<HookStatus>(), Ok(status));
		}
		assert!("pending".parse::<HookStatus>().is_err());
	}

	#[test]
	fn build_ref_serializes_as_ref() {
		let build = Build {
			git_ref: "refs/heads/main".to_string(),
			..Default::default()
		};
		let json = serde_json::to_value(&build).unwrap();
		assert_eq!(json["ref"], "refs/heads/main");
	}
}

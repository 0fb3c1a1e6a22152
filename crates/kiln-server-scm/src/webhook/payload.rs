// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The subset of GitHub webhook payloads the normalizer reads.
//!
//! Every struct is `#[serde(default)]` and the fields GitHub documents as
//! nullable go through [`null_as_default`]: a missing or `null` field must
//! never fail a delivery that is otherwise usable.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::events;

/// A decoded delivery, tagged by its `X-GitHub-Event` header.
#[derive(Debug)]
pub enum RawEvent {
	Push(PushPayload),
	PullRequest(PullRequestPayload),
	Deployment(DeploymentPayload),
	IssueComment(IssueCommentPayload),
	Repository(RepositoryPayload),
	CustomPropertyValues(CustomPropertyValuesPayload),
	Installation(InstallationPayload),
	InstallationRepositories(InstallationRepositoriesPayload),
	MergeGroup(MergeGroupPayload),
	Unknown { kind: String },
}

impl RawEvent {
	pub fn decode(kind: &str, body: &[u8]) -> Result<Self, serde_json::Error> {
		Ok(match kind {
			"push" => RawEvent::Push(serde_json::from_slice(body)?),
			"pull_request" => RawEvent::PullRequest(serde_json::from_slice(body)?),
			"deployment" => RawEvent::Deployment(serde_json::from_slice(body)?),
			"issue_comment" => RawEvent::IssueComment(serde_json::from_slice(body)?),
			"repository" => RawEvent::Repository(serde_json::from_slice(body)?),
			"custom_property_values" => {
				RawEvent::CustomPropertyValues(serde_json::from_slice(body)?)
			}
			"installation" => RawEvent::Installation(serde_json::from_slice(body)?),
			"installation_repositories" => {
				RawEvent::InstallationRepositories(serde_json::from_slice(body)?)
			}
			"merge_group" => RawEvent::MergeGroup(serde_json::from_slice(body)?),
			other => {
				// Still require well-formed JSON so garbage is reported as such.
				serde_json::from_slice::<serde::de::IgnoredAny>(body)?;
				RawEvent::Unknown {
					kind: other.to_string(),
				}
			}
		})
	}

	/// Name recorded on the hook before event-specific rules refine it.
	pub fn hook_event(&self) -> &str {
		match self {
			RawEvent::Push(_) => events::PUSH,
			RawEvent::PullRequest(_) => events::PULL_REQUEST,
			RawEvent::Deployment(_) => events::DEPLOYMENT,
			RawEvent::IssueComment(_) => events::COMMENT,
			RawEvent::Repository(_) => events::REPOSITORY,
			RawEvent::CustomPropertyValues(_) => events::CUSTOM_PROPERTIES,
			RawEvent::Installation(_) => events::INSTALLATION,
			RawEvent::InstallationRepositories(_) => events::INSTALLATION_REPOSITORIES,
			RawEvent::MergeGroup(_) => events::MERGE_GROUP,
			RawEvent::Unknown { kind } => kind,
		}
	}
}

/// `null` decodes as `T::default()`, the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct User {
	pub id: i64,
	#[serde(deserialize_with = "null_as_default")]
	pub login: String,
	pub name: Option<String>,
	pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Repository {
	pub id: i64,
	#[serde(deserialize_with = "null_as_default")]
	pub name: String,
	#[serde(deserialize_with = "null_as_default")]
	pub full_name: String,
	pub owner: User,
	#[serde(deserialize_with = "null_as_default")]
	pub html_url: String,
	#[serde(deserialize_with = "null_as_default")]
	pub clone_url: String,
	#[serde(deserialize_with = "null_as_default")]
	pub default_branch: String,
	pub private: bool,
	pub archived: bool,
	pub fork: bool,
	#[serde(deserialize_with = "null_as_default")]
	pub topics: Vec<String>,
	pub custom_properties: BTreeMap<String, Value>,
}

/// `installation` block attached to deliveries sent to a GitHub App.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InstallationRef {
	pub id: i64,
	pub account: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommitAuthor {
	#[serde(deserialize_with = "null_as_default")]
	pub name: String,
	#[serde(deserialize_with = "null_as_default")]
	pub email: String,
	pub username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Commit {
	#[serde(deserialize_with = "null_as_default")]
	pub id: String,
	#[serde(deserialize_with = "null_as_default")]
	pub message: String,
	#[serde(deserialize_with = "null_as_default")]
	pub url: String,
	pub author: CommitAuthor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PushPayload {
	#[serde(rename = "ref")]
	pub git_ref: String,
	pub before: String,
	pub after: String,
	pub base_ref: Option<String>,
	pub compare: String,
	pub deleted: bool,
	pub head_commit: Option<Commit>,
	pub pusher: CommitAuthor,
	pub repository: Repository,
	pub sender: User,
	pub installation: Option<InstallationRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Label {
	#[serde(deserialize_with = "null_as_default")]
	pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PullRequestRef {
	#[serde(rename = "ref")]
	pub git_ref: String,
	#[serde(deserialize_with = "null_as_default")]
	pub sha: String,
	/// Null when the head fork has been deleted.
	pub repo: Option<Repository>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PullRequestBody {
	pub number: i64,
	#[serde(deserialize_with = "null_as_default")]
	pub state: String,
	#[serde(deserialize_with = "null_as_default")]
	pub title: String,
	#[serde(deserialize_with = "null_as_default")]
	pub html_url: String,
	#[serde(deserialize_with = "null_as_default")]
	pub merged: bool,
	pub user: User,
	pub head: PullRequestRef,
	pub base: PullRequestRef,
	pub labels: Vec<Label>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PullRequestPayload {
	pub action: String,
	pub number: i64,
	pub pull_request: PullRequestBody,
	/// The label added or removed, for `labeled` / `unlabeled`.
	pub label: Option<Label>,
	pub repository: Repository,
	pub sender: User,
	pub installation: Option<InstallationRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeploymentBody {
	pub id: i64,
	#[serde(deserialize_with = "null_as_default")]
	pub url: String,
	#[serde(deserialize_with = "null_as_default")]
	pub sha: String,
	#[serde(rename = "ref")]
	pub git_ref: String,
	#[serde(deserialize_with = "null_as_default")]
	pub task: String,
	#[serde(deserialize_with = "null_as_default")]
	pub environment: String,
	pub description: Option<String>,
	pub payload: Value,
	pub created_at: Option<DateTime<Utc>>,
	pub creator: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeploymentPayload {
	pub action: String,
	pub deployment: DeploymentBody,
	pub repository: Repository,
	pub sender: User,
	pub installation: Option<InstallationRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Issue {
	pub number: i64,
	#[serde(deserialize_with = "null_as_default")]
	pub title: String,
	#[serde(deserialize_with = "null_as_default")]
	pub html_url: String,
	pub user: User,
	/// Present only when the issue is a pull request.
	pub pull_request: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Comment {
	#[serde(deserialize_with = "null_as_default")]
	pub body: String,
	#[serde(deserialize_with = "null_as_default")]
	pub html_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IssueCommentPayload {
	pub action: String,
	pub issue: Issue,
	pub comment: Comment,
	pub repository: Repository,
	pub sender: User,
	pub installation: Option<InstallationRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RepositoryPayload {
	pub action: String,
	pub repository: Repository,
	pub sender: User,
	pub installation: Option<InstallationRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PropertyValue {
	pub property_name: String,
	pub value: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CustomPropertyValuesPayload {
	pub action: String,
	pub repository: Repository,
	pub new_property_values: Vec<PropertyValue>,
	pub sender: User,
	pub installation: Option<InstallationRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RepositoryRef {
	pub name: String,
	pub full_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InstallationPayload {
	pub action: String,
	pub installation: InstallationRef,
	pub repositories: Vec<RepositoryRef>,
	pub sender: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InstallationRepositoriesPayload {
	pub action: String,
	pub installation: InstallationRef,
	pub repositories_added: Vec<RepositoryRef>,
	pub repositories_removed: Vec<RepositoryRef>,
	pub sender: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeGroup {
	pub head_sha: String,
	pub head_ref: String,
	pub base_sha: String,
	pub base_ref: String,
	pub head_commit: Option<Commit>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MergeGroupPayload {
	pub action: String,
	pub merge_group: MergeGroup,
	pub repository: Repository,
	pub sender: User,
	pub installation: Option<InstallationRef>,
}

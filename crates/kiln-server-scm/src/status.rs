// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Projects build and step status onto GitHub.
//!
//! Repositories linked to an installation get check runs, created once per
//! context and updated afterwards by the id cached in [`InstallTokenCache`].
//! Everything else gets commit statuses. Deployment builds always report a
//! deployment status instead.

use std::sync::Arc;

use kiln_common_secret::SecretString;
use kiln_server_github_app::{
	CheckRunConclusion, CheckRunOutput, CheckRunRef, CheckRunRequest, CheckRunStatus,
	CheckRunTarget, CommitState, CommitStatusRequest, CredentialManager, DeploymentState,
	DeploymentStatusRequest, GithubAppClient, ScmCredential,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::ReportError;
use crate::types::events;

pub const DEFAULT_STATUS_CONTEXT: &str = "kiln";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
	Pending,
	PendingApproval,
	Running,
	Success,
	Failure,
	Canceled,
	Killed,
	Skipped,
	Error,
}

impl BuildStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			BuildStatus::Pending => "pending",
			BuildStatus::PendingApproval => "pending_approval",
			BuildStatus::Running => "running",
			BuildStatus::Success => "success",
			BuildStatus::Failure => "failure",
			BuildStatus::Canceled => "canceled",
			BuildStatus::Killed => "killed",
			BuildStatus::Skipped => "skipped",
			BuildStatus::Error => "error",
		}
	}

	/// No further transitions follow a terminal status.
	pub fn is_terminal(&self) -> bool {
		!matches!(
			self,
			BuildStatus::Pending | BuildStatus::PendingApproval | BuildStatus::Running
		)
	}

	fn describe(&self, subject: &str) -> String {
		match self {
			BuildStatus::Pending => format!("the {subject} is pending"),
			BuildStatus::PendingApproval => {
				format!("the {subject} needs approval from a repository admin to run")
			}
			BuildStatus::Running => format!("the {subject} is running"),
			BuildStatus::Success => format!("the {subject} was successful"),
			BuildStatus::Failure => format!("the {subject} has failed"),
			BuildStatus::Canceled => format!("the {subject} was canceled"),
			BuildStatus::Killed => format!("the {subject} was killed"),
			BuildStatus::Skipped => format!("the {subject} was skipped"),
			BuildStatus::Error => format!("there was an error running the {subject}"),
		}
	}
}

impl std::str::FromStr for BuildStatus {
	type Err = ();
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(BuildStatus::Pending),
			"pending_approval" => Ok(BuildStatus::PendingApproval),
			"running" => Ok(BuildStatus::Running),
			"success" => Ok(BuildStatus::Success),
			"failure" => Ok(BuildStatus::Failure),
			"canceled" => Ok(BuildStatus::Canceled),
			"killed" => Ok(BuildStatus::Killed),
			"skipped" => Ok(BuildStatus::Skipped),
			"error" => Ok(BuildStatus::Error),
			_ => Err(()),
		}
	}
}

pub fn check_run_state(status: BuildStatus) -> (CheckRunStatus, Option<CheckRunConclusion>) {
	match status {
		BuildStatus::Running => (CheckRunStatus::InProgress, None),
		BuildStatus::Pending | BuildStatus::PendingApproval => (CheckRunStatus::Queued, None),
		BuildStatus::Success => (CheckRunStatus::Completed, Some(CheckRunConclusion::Success)),
		BuildStatus::Canceled | BuildStatus::Killed => {
			(CheckRunStatus::Completed, Some(CheckRunConclusion::Cancelled))
		}
		BuildStatus::Skipped => (CheckRunStatus::Completed, Some(CheckRunConclusion::Skipped)),
		BuildStatus::Failure | BuildStatus::Error => {
			(CheckRunStatus::Completed, Some(CheckRunConclusion::Failure))
		}
	}
}

pub fn commit_state(status: BuildStatus) -> CommitState {
	match status {
		BuildStatus::Pending | BuildStatus::PendingApproval | BuildStatus::Running => {
			CommitState::Pending
		}
		BuildStatus::Success | BuildStatus::Skipped => CommitState::Success,
		BuildStatus::Failure | BuildStatus::Canceled | BuildStatus::Killed => CommitState::Failure,
		BuildStatus::Error => CommitState::Error,
	}
}

pub fn deployment_state(status: BuildStatus) -> DeploymentState {
	match status {
		BuildStatus::Pending | BuildStatus::PendingApproval => DeploymentState::Queued,
		BuildStatus::Running => DeploymentState::InProgress,
		BuildStatus::Success => DeploymentState::Success,
		BuildStatus::Failure | BuildStatus::Killed => DeploymentState::Failure,
		BuildStatus::Canceled => DeploymentState::Inactive,
		BuildStatus::Skipped | BuildStatus::Error => DeploymentState::Error,
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
	pub org: String,
	pub name: String,
	pub full_name: String,
	/// 0 when the repository is not linked to an app installation.
	pub install_id: i64,
}

/// What the reporter needs to know about a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildState {
	pub id: i64,
	pub number: i64,
	pub event: String,
	pub status: BuildStatus,
	pub commit: String,
	/// GitHub deployment id for deployment builds.
	pub deploy_number: i64,
	pub build_timeout_minutes: u64,
	pub repo: RepoRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
	pub id: i64,
	pub number: i64,
	pub name: String,
	/// Context suffix. Steps without one are not reported.
	pub report_as: String,
	pub status: BuildStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSettings {
	pub status_context: String,
	/// Public UI base, e.g. `https://ci.example.com`. Empty omits links.
	pub web_address: String,
	/// Contexts a merge-queue build reports under.
	pub merge_group_contexts: Vec<String>,
}

impl Default for StatusSettings {
	fn default() -> Self {
		Self {
			status_context: DEFAULT_STATUS_CONTEXT.to_string(),
			web_address: String::new(),
			merge_group_contexts: vec![events::PULL_REQUEST.to_string(), events::PUSH.to_string()],
		}
	}
}

/// One status to publish: its context, link and the check-run cache slot.
struct Report<'a> {
	build: &'a BuildState,
	target: CheckRunTarget,
	contexts: Vec<String>,
	status: BuildStatus,
	description: String,
	url: Option<String>,
	external_id: String,
}

pub struct StatusReporter {
	client: Arc<GithubAppClient>,
	credentials: Arc<CredentialManager>,
	settings: StatusSettings,
}

impl std::fmt::Debug for StatusReporter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StatusReporter")
			.field("settings", &self.settings)
			.finish_non_exhaustive()
	}
}

impl StatusReporter {
	pub fn new(
		client: Arc<GithubAppClient>,
		credentials: Arc<CredentialManager>,
		settings: StatusSettings,
	) -> Self {
		Self {
			client,
			credentials,
			settings,
		}
	}

	pub fn settings(&self) -> &StatusSettings {
		&self.settings
	}

	/// Events a build reports under. Merge-queue builds stand in for the
	/// events branch protection checks.
	fn event_contexts(&self, event: &str) -> Vec<String> {
		if event == events::MERGE_GROUP && !self.settings.merge_group_contexts.is_empty() {
			self.settings.merge_group_contexts.clone()
		} else {
			vec![event.to_string()]
		}
	}

	fn build_url(&self, build: &BuildState) -> Option<String> {
		if self.settings.web_address.is_empty() {
			return None;
		}
		Some(format!(
			"{}/{}/{}",
			self.settings.web_address.trim_end_matches('/'),
			build.repo.full_name,
			build.number
		))
	}

	#[instrument(
		skip(self, build, legacy_token, cancel),
		fields(repo = %build.repo.full_name, build = build.number, status = build.status.as_str())
	)]
	pub async fn report_build(
		&self,
		build: &BuildState,
		legacy_token: Option<&SecretString>,
		cancel: &CancellationToken,
	) -> Result<(), ReportError> {
		let credential = self.credential(build, legacy_token, cancel).await?;

		if build.event == events::DEPLOYMENT {
			return self.report_deployment(build, &credential, cancel).await;
		}

		let report = Report {
			build,
			target: CheckRunTarget::Build(build.id),
			contexts: self
				.event_contexts(&build.event)
				.into_iter()
				.map(|event| format!("{}/{event}", self.settings.status_context))
				.collect(),
			status: build.status,
			description: build.status.describe("build"),
			url: self.build_url(build),
			external_id: build.id.to_string(),
		};
		self.publish(report, &credential, cancel).await
	}

	#[instrument(
		skip(self, build, step, legacy_token, cancel),
		fields(repo = %build.repo.full_name, build = build.number, step = %step.name)
	)]
	pub async fn report_step(
		&self,
		build: &BuildState,
		step: &StepState,
		legacy_token: Option<&SecretString>,
		cancel: &CancellationToken,
	) -> Result<(), ReportError> {
		if step.report_as.is_empty() || build.event == events::DEPLOYMENT {
			debug!("step is not reported");
			return Ok(());
		}

		let credential = self.credential(build, legacy_token, cancel).await?;

		let report = Report {
			build,
			target: CheckRunTarget::Step(step.id),
			contexts: self
				.event_contexts(&build.event)
				.into_iter()
				.map(|event| format!("{}/{event}/{}", self.settings.status_context, step.report_as))
				.collect(),
			status: step.status,
			description: step.status.describe("step"),
			url: self.build_url(build).map(|url| format!("{url}#{}", step.number)),
			external_id: format!("{}:{}", build.id, step.id),
		};
		self.publish(report, &credential, cancel).await
	}

	async fn credential(
		&self,
		build: &BuildState,
		legacy_token: Option<&SecretString>,
		cancel: &CancellationToken,
	) -> Result<ScmCredential, ReportError> {
		self
			.credentials
			.credential_for_repo(
				&build.repo.full_name,
				build.repo.install_id,
				legacy_token,
				cancel,
			)
			.await
			.map_err(ReportError::from_credential)
	}

	async fn publish(
		&self,
		report: Report<'_>,
		credential: &ScmCredential,
		cancel: &CancellationToken,
	) -> Result<(), ReportError> {
		if credential.is_installation() {
			self.publish_check_runs(report, credential.token(), cancel).await
		} else {
			self.publish_commit_statuses(report, credential.token(), cancel).await
		}
	}

	async fn publish_commit_statuses(
		&self,
		report: Report<'_>,
		token: &SecretString,
		cancel: &CancellationToken,
	) -> Result<(), ReportError> {
		let repo = &report.build.repo;
		for context in &report.contexts {
			let body = CommitStatusRequest {
				state: commit_state(report.status),
				context: context.clone(),
				description: report.description.clone(),
				target_url: report.url.clone(),
			};
			self
				.client
				.create_commit_status(token, &repo.org, &repo.name, &report.build.commit, &body, cancel)
				.await
				.map_err(|e| ReportError::from_post(context, e))?;
			debug!(context = %context, state = ?body.state, "posted commit status");
		}
		Ok(())
	}

	async fn publish_check_runs(
		&self,
		report: Report<'_>,
		token: &SecretString,
		cancel: &CancellationToken,
	) -> Result<(), ReportError> {
		let cache = self.credentials.cache();
		let finished = report.status.is_terminal();
		let mut runs = cache.get_check_runs(report.target, finished).await?;

		let result = self.post_check_runs(&report, token, &mut runs, cancel).await;

		// A finished report keeps its ids for the grace period only, so a
		// repeated terminal report still updates instead of creating.
		let ttl = if finished && result.is_ok() {
			cache.grace()
		} else {
			cache.check_run_ttl(report.build.build_timeout_minutes)
		};
		cache.put_check_runs(report.target, &runs, ttl).await?;
		result
	}

	async fn post_check_runs(
		&self,
		report: &Report<'_>,
		token: &SecretString,
		runs: &mut Vec<CheckRunRef>,
		cancel: &CancellationToken,
	) -> Result<(), ReportError> {
		let build = report.build;
		let (status, conclusion) = check_run_state(report.status);

		for context in &report.contexts {
			let existing = runs.iter().find(|r| &r.context == context).map(|r| r.id);
			let mut body = CheckRunRequest {
				name: None,
				head_sha: None,
				status,
				conclusion,
				details_url: report.url.clone(),
				external_id: Some(report.external_id.clone()),
				output: Some(CheckRunOutput {
					title: report.description.clone(),
					summary: report.description.clone(),
				}),
			};

			match existing {
				Some(id) => {
					self
						.client
						.update_check_run(token, &build.repo.org, &build.repo.name, id, &body, cancel)
						.await
						.map_err(|e| ReportError::from_post(context, e))?;
					debug!(context = %context, check_run_id = id, "updated check run");
				}
				None => {
					body.name = Some(context.clone());
					body.head_sha = Some(build.commit.clone());
					let id = self
						.client
						.create_check_run(token, &build.repo.org, &build.repo.name, &body, cancel)
						.await
						.map_err(|e| ReportError::from_post(context, e))?;
					info!(context = %context, check_run_id = id, "created check run");
					runs.push(CheckRunRef {
						id,
						context: context.clone(),
						repo: build.repo.full_name.clone(),
						build_number: build.number,
					});
				}
			}
		}
		Ok(())
	}

	async fn report_deployment(
		&self,
		build: &BuildState,
		credential: &ScmCredential,
		cancel: &CancellationToken,
	) -> Result<(), ReportError> {
		let context = format!("{}/{}", self.settings.status_context, events::DEPLOYMENT);
		let body = DeploymentStatusRequest {
			state: deployment_state(build.status),
			description: build.status.describe("build"),
			log_url: self.build_url(build),
			environment: None,
		};

		self
			.client
			.create_deployment_status(
				credential.token(),
				&build.repo.org,
				&build.repo.name,
				build.deploy_number,
				&body,
				cancel,
			)
			.await
			.map_err(|e| ReportError::from_post(&context, e))?;

		debug!(deployment = build.deploy_number, state = ?body.state, "posted deployment status");
		Ok(())
	}
}

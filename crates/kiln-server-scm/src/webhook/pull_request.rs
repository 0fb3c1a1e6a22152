// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use super::payload::{PullRequestBody, PullRequestPayload};
use super::{convert_repo, hook_link, skipped};
use crate::types::{actions, events, Build, Hook, NormalizedEvent, PullRequest};

const BUILD_ACTIONS: &[&str] = &[
	actions::OPENED,
	actions::SYNCHRONIZE,
	actions::REOPENED,
	actions::EDITED,
	actions::LABELED,
	actions::UNLABELED,
];

/// A fork only counts as external when it is a different repository. A fork
/// can share the base's full name when it lives in the same account.
pub(crate) fn is_cross_fork(pr: &PullRequestBody) -> bool {
	let Some(head) = pr.head.repo.as_ref() else {
		return false;
	};
	let base = pr.base.repo.as_ref().map(|r| r.full_name.as_str()).unwrap_or_default();
	head.fork && !head.full_name.eq_ignore_ascii_case(base)
}

pub(super) fn normalize(mut hook: Hook, payload: PullRequestPayload) -> NormalizedEvent {
	hook.event = events::PULL_REQUEST.to_string();
	hook.event_action = payload.action.clone();
	hook.link = hook_link(&hook.host, &payload.repository.full_name);

	let pr = &payload.pull_request;
	hook.branch = pr.base.git_ref.clone();

	if !BUILD_ACTIONS.contains(&payload.action.as_str()) {
		return skipped(hook, format!("pull_request action {} does not trigger builds", payload.action));
	}
	if pr.state != "open" {
		return skipped(hook, format!("pull request is {}", pr.state));
	}

	let repo = convert_repo(&payload.repository, payload.installation.as_ref());
	let number = if pr.number != 0 { pr.number } else { payload.number };
	let fork = is_cross_fork(pr);

	let git_ref = if pr.merged {
		format!("refs/pull/{number}/merge")
	} else {
		format!("refs/pull/{number}/head")
	};

	// Labeling runs only care about the label that changed.
	let labels = match (payload.action.as_str(), payload.label.as_ref()) {
		(actions::LABELED | actions::UNLABELED, Some(label)) => vec![label.name.clone()],
		_ => pr.labels.iter().map(|l| l.name.clone()).collect(),
	};

	let email = pr
		.user
		.email
		.clone()
		.filter(|e| !e.is_empty())
		.or_else(|| payload.sender.email.clone())
		.unwrap_or_default();

	let build = Build {
		event: events::PULL_REQUEST.to_string(),
		event_action: payload.action.clone(),
		commit: pr.head.sha.clone(),
		git_ref,
		base_ref: pr.base.git_ref.clone(),
		head_ref: pr.head.git_ref.clone(),
		branch: pr.base.git_ref.clone(),
		sender: payload.sender.login.clone(),
		sender_scm_id: payload.sender.id.to_string(),
		author: pr.user.login.clone(),
		email,
		clone: payload.repository.clone_url.clone(),
		source: pr.html_url.clone(),
		title: format!("pull_request received from {}", payload.repository.html_url),
		message: pr.title.clone(),
		fork,
		..Default::default()
	};

	NormalizedEvent {
		repo: Some(repo),
		build: Some(build),
		pull_request: Some(PullRequest {
			number,
			comment: String::new(),
			labels,
			is_from_fork: fork,
		}),
		..NormalizedEvent::hook_only(hook)
	}
}

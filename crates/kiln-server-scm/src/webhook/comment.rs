// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use super::payload::IssueCommentPayload;
use super::{convert_repo, hook_link, skipped};
use crate::types::{actions, events, Build, Hook, NormalizedEvent, PullRequest};

pub(super) fn normalize(mut hook: Hook, payload: IssueCommentPayload) -> NormalizedEvent {
	hook.event = events::COMMENT.to_string();
	hook.event_action = payload.action.clone();
	hook.link = hook_link(&hook.host, &payload.repository.full_name);

	if payload.action == actions::DELETED {
		return skipped(hook, "deleted comments do not trigger builds".to_string());
	}
	if payload.issue.pull_request.is_none() {
		return skipped(hook, "comment is not on a pull request".to_string());
	}

	let repo = convert_repo(&payload.repository, payload.installation.as_ref());
	let number = payload.issue.number;

	// The commit and branch are not in the payload; they are resolved from
	// the pull request when the build is scheduled.
	let build = Build {
		event: events::COMMENT.to_string(),
		event_action: payload.action.clone(),
		git_ref: format!("refs/pull/{number}/head"),
		sender: payload.sender.login.clone(),
		sender_scm_id: payload.sender.id.to_string(),
		author: payload.issue.user.login.clone(),
		email: payload.sender.email.clone().unwrap_or_default(),
		clone: payload.repository.clone_url.clone(),
		source: payload.comment.html_url.clone(),
		title: format!("comment received from {}", payload.repository.html_url),
		message: payload.issue.title.clone(),
		..Default::default()
	};

	NormalizedEvent {
		repo: Some(repo),
		build: Some(build),
		pull_request: Some(PullRequest {
			number,
			comment: payload.comment.body,
			labels: Vec::new(),
			is_from_fork: false,
		}),
		..NormalizedEvent::hook_only(hook)
	}
}

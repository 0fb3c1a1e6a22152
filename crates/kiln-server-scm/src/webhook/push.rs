// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use super::payload::PushPayload;
use super::{convert_repo, hook_link, strip_branch};
use crate::types::{actions, events, Build, Hook, NormalizedEvent};

const TAG_PREFIX: &str = "refs/tags/";

/// A push whose resulting commit is empty or all zeros removed its ref.
fn is_delete(payload: &PushPayload) -> bool {
	payload.deleted || payload.after.is_empty() || payload.after.bytes().all(|b| b == b'0')
}

pub(super) fn normalize(mut hook: Hook, payload: PushPayload) -> NormalizedEvent {
	let repo = convert_repo(&payload.repository, payload.installation.as_ref());
	let head = payload.head_commit.as_ref();

	let author = head
		.and_then(|c| c.author.username.clone())
		.filter(|u| !u.is_empty())
		.unwrap_or_else(|| payload.sender.login.clone());
	let email = head
		.map(|c| c.author.email.clone())
		.filter(|e| !e.is_empty())
		.unwrap_or_else(|| payload.pusher.email.clone());

	let mut build = Build {
		event: events::PUSH.to_string(),
		commit: head
			.map(|c| c.id.clone())
			.filter(|id| !id.is_empty())
			.unwrap_or_else(|| payload.after.clone()),
		git_ref: payload.git_ref.clone(),
		branch: strip_branch(&payload.git_ref).to_string(),
		sender: payload.sender.login.clone(),
		sender_scm_id: payload.sender.id.to_string(),
		author,
		email,
		clone: payload.repository.clone_url.clone(),
		source: payload.compare.clone(),
		title: format!("push received from {}", payload.repository.html_url),
		message: head.map(|c| c.message.clone()).unwrap_or_default(),
		..Default::default()
	};

	let tag = payload.git_ref.strip_prefix(TAG_PREFIX);

	if is_delete(&payload) {
		let (action, name) = match tag {
			Some(name) => (actions::TAG, name),
			None => (actions::BRANCH, strip_branch(&payload.git_ref)),
		};
		build.event = events::DELETE.to_string();
		build.event_action = action.to_string();
		build.commit = payload.before.clone();
		build.branch = name.to_string();
		build.message = format!("{name} {action} deleted");
	} else if tag.is_some() {
		build.event = events::TAG.to_string();
		build.branch = match payload.base_ref.as_deref().filter(|r| !r.is_empty()) {
			Some(base_ref) => strip_branch(base_ref).to_string(),
			None => repo.branch.clone(),
		};
	}

	hook.event = build.event.clone();
	hook.event_action = build.event_action.clone();
	hook.branch = build.branch.clone();
	hook.link = hook_link(&hook.host, &repo.full_name);

	NormalizedEvent {
		repo: Some(repo),
		build: Some(build),
		..NormalizedEvent::hook_only(hook)
	}
}

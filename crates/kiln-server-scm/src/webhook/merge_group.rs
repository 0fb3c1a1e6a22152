// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use super::payload::MergeGroupPayload;
use super::{convert_repo, hook_link, skipped, strip_branch};
use crate::types::{actions, events, Build, Hook, NormalizedEvent};

pub(super) fn normalize(mut hook: Hook, payload: MergeGroupPayload) -> NormalizedEvent {
	hook.event = events::MERGE_GROUP.to_string();
	hook.event_action = payload.action.clone();
	hook.link = hook_link(&hook.host, &payload.repository.full_name);

	let group = &payload.merge_group;
	let branch = strip_branch(&group.base_ref).to_string();
	hook.branch = branch.clone();

	if payload.action != actions::CHECKS_REQUESTED {
		return skipped(hook, format!("merge_group action {} does not trigger builds", payload.action));
	}

	let repo = convert_repo(&payload.repository, payload.installation.as_ref());
	let head = group.head_commit.as_ref();

	let build = Build {
		event: events::MERGE_GROUP.to_string(),
		event_action: payload.action.clone(),
		commit: group.head_sha.clone(),
		git_ref: group.head_ref.clone(),
		base_ref: group.base_ref.clone(),
		head_ref: group.head_ref.clone(),
		branch,
		sender: payload.sender.login.clone(),
		sender_scm_id: payload.sender.id.to_string(),
		author: head
			.and_then(|c| c.author.username.clone())
			.unwrap_or_else(|| payload.sender.login.clone()),
		email: head.map(|c| c.author.email.clone()).unwrap_or_default(),
		clone: payload.repository.clone_url.clone(),
		source: payload.repository.html_url.clone(),
		title: format!("merge_group received from {}", payload.repository.html_url),
		message: head.map(|c| c.message.clone()).unwrap_or_default(),
		..Default::default()
	};

	NormalizedEvent {
		repo: Some(repo),
		build: Some(build),
		..NormalizedEvent::hook_only(hook)
	}
}

#[cfg(test)]
mod tests {
	use super::super::test_support::headers;
	use super::super::WebhookNormalizer;
	use crate::types::{HookStatus, NormalizedEvent};
	use serde_json::json;

	fn process(action: &str) -> NormalizedEvent {
		let body = json!({
			"action": action,
			"merge_group": {
				"head_sha": "ec26c3e57ca3a959ca5aad62de7213c562f8c821",
				"head_ref": "refs/heads/gh-readonly-queue/main/pr-104-abc",
				"base_sha": "380387fca8b3a0eaaabf4b0c5c0d4bd1b0fbf6bd",
				"base_ref": "refs/heads/main",
				"head_commit": {
					"id": "ec26c3e57ca3a959ca5aad62de7213c562f8c821",
					"message": "Merge pull request #104",
					"author": {"name": "Octo", "email": "octo@example.com"}
				}
			},
			"repository": {"name": "widgets", "full_name": "octo/widgets", "owner": {"login": "octo"}},
			"sender": {"id": 1, "login": "octocat"}
		});
		WebhookNormalizer::new(None)
			.process_webhook(&headers("merge_group"), &serde_json::to_vec(&body).unwrap())
	}

	#[test]
	fn checks_requested_builds_queue_head() {
		let event = process("checks_requested");
		let build = event.build.unwrap();

		assert_eq!(build.event, "merge_group");
		assert_eq!(build.commit, "ec26c3e57ca3a959ca5aad62de7213c562f8c821");
		assert_eq!(build.git_ref, "refs/heads/gh-readonly-queue/main/pr-104-abc");
		assert_eq!(build.branch, "main");
		assert_eq!(build.author, "octocat");
		assert_eq!(build.email, "octo@example.com");
		assert_eq!(event.hook.branch, "main");
	}

	#[test]
	fn destroyed_group_is_skipped() {
		let event = process("destroyed");
		assert_eq!(event.hook.status, HookStatus::Skipped);
		assert!(event.build.is_none());
	}
}

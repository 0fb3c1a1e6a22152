// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use super::installation_link;
use super::payload::{InstallationPayload, InstallationRepositoriesPayload, RepositoryRef};
use crate::types::{actions, events, Hook, Installation, NormalizedEvent};

fn names(repos: Vec<RepositoryRef>) -> Vec<String> {
	repos.into_iter().map(|r| r.name).collect()
}

/// App installed on, or removed from, an account. The repositories listed in
/// the payload are the ones the installation covers.
pub(super) fn normalize(mut hook: Hook, payload: InstallationPayload) -> NormalizedEvent {
	hook.event = events::INSTALLATION.to_string();
	hook.event_action = payload.action.clone();
	hook.link = installation_link(&hook.host, &payload.installation.account.login);

	let (added, removed) = match payload.action.as_str() {
		actions::CREATED => (names(payload.repositories), Vec::new()),
		actions::DELETED => (Vec::new(), names(payload.repositories)),
		_ => (Vec::new(), Vec::new()),
	};

	NormalizedEvent {
		installation: Some(Installation {
			action: payload.action,
			id: payload.installation.id,
			org: payload.installation.account.login,
			repositories_added: added,
			repositories_removed: removed,
		}),
		..NormalizedEvent::hook_only(hook)
	}
}

pub(super) fn normalize_repositories(
	mut hook: Hook,
	payload: InstallationRepositoriesPayload,
) -> NormalizedEvent {
	hook.event = events::INSTALLATION_REPOSITORIES.to_string();
	hook.event_action = payload.action.clone();
	hook.link = installation_link(&hook.host, &payload.installation.account.login);

	NormalizedEvent {
		installation: Some(Installation {
			action: payload.action,
			id: payload.installation.id,
			org: payload.installation.account.login,
			repositories_added: names(payload.repositories_added),
			repositories_removed: names(payload.repositories_removed),
		}),
		..NormalizedEvent::hook_only(hook)
	}
}

#[cfg(test)]
mod tests {
	use super::super::test_support::headers;
	use super::super::WebhookNormalizer;
	use serde_json::json;

	fn installation_event(action: &str) -> crate::types::NormalizedEvent {
		let body = json!({
			"action": action,
			"installation": {"id": 4242, "account": {"login": "octo"}},
			"repositories": [
				{"name": "widgets", "full_name": "octo/widgets"},
				{"name": "gadgets", "full_name": "octo/gadgets"}
			],
			"sender": {"login": "octocat"}
		});
		WebhookNormalizer::new(None)
			.process_webhook(&headers("installation"), &serde_json::to_vec(&body).unwrap())
	}

	#[test]
	fn created_installation_adds_repositories() {
		let event = installation_event("created");
		assert_eq!(event.hook.event, "installation");
		assert_eq!(
			event.hook.link,
			"https://github.com/organizations/octo/settings/installations"
		);

		let installation = event.installation.unwrap();
		assert_eq!(installation.id, 4242);
		assert_eq!(installation.org, "octo");
		assert_eq!(installation.repositories_added, vec!["widgets", "gadgets"]);
		assert!(installation.repositories_removed.is_empty());
	}

	#[test]
	fn deleted_installation_removes_repositories() {
		let installation = installation_event("deleted").installation.unwrap();
		assert_eq!(installation.action, "deleted");
		assert!(installation.repositories_added.is_empty());
		assert_eq!(installation.repositories_removed, vec!["widgets", "gadgets"]);
	}

	#[test]
	fn suspended_installation_touches_nothing() {
		let installation = installation_event("suspend").installation.unwrap();
		assert!(installation.repositories_added.is_empty());
		assert!(installation.repositories_removed.is_empty());
	}

	#[test]
	fn installation_repositories_carries_both_lists() {
		let body = json!({
			"action": "added",
			"installation": {"id": 4242, "account": {"login": "octo"}},
			"repositories_added": [{"name": "new-repo", "full_name": "octo/new-repo"}],
			"repositories_removed": [{"name": "gone", "full_name": "octo/gone"}]
		});
		let event = WebhookNormalizer::new(None)
			.process_webhook(&headers("installation_repositories"), &serde_json::to_vec(&body).unwrap());

		assert_eq!(event.hook.event, "installation_repositories");
		assert_eq!(
			event.hook.link,
			"https://github.com/organizations/octo/settings/installations"
		);
		let installation = event.installation.unwrap();
		assert_eq!(installation.repositories_added, vec!["new-repo"]);
		assert_eq!(installation.repositories_removed, vec!["gone"]);
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use super::payload::{CustomPropertyValuesPayload, RepositoryPayload};
use super::{convert_repo, hook_link};
use crate::types::{events, Hook, NormalizedEvent};

/// Repository settings changed (renamed, archived, visibility...). Only the
/// repository record is produced.
pub(super) fn normalize(mut hook: Hook, payload: RepositoryPayload) -> NormalizedEvent {
	hook.event = events::REPOSITORY.to_string();
	hook.event_action = payload.action.clone();
	hook.link = hook_link(&hook.host, &payload.repository.full_name);
	hook.branch = payload.repository.default_branch.clone();

	NormalizedEvent {
		repo: Some(convert_repo(&payload.repository, payload.installation.as_ref())),
		..NormalizedEvent::hook_only(hook)
	}
}

/// The values in the payload replace whatever the repository block carries.
pub(super) fn normalize_custom_properties(
	mut hook: Hook,
	payload: CustomPropertyValuesPayload,
) -> NormalizedEvent {
	hook.event = events::CUSTOM_PROPERTIES.to_string();
	hook.event_action = payload.action.clone();
	hook.link = hook_link(&hook.host, &payload.repository.full_name);
	hook.branch = payload.repository.default_branch.clone();

	let mut repo = convert_repo(&payload.repository, payload.installation.as_ref());
	repo.custom_properties = payload
		.new_property_values
		.into_iter()
		.map(|p| (p.property_name, p.value))
		.collect();

	NormalizedEvent {
		repo: Some(repo),
		..NormalizedEvent::hook_only(hook)
	}
}

#[cfg(test)]
mod tests {
	use super::super::test_support::headers;
	use super::super::WebhookNormalizer;
	use crate::types::HookStatus;
	use serde_json::json;

	#[test]
	fn archived_repository_is_inactive() {
		let body = json!({
			"action": "archived",
			"repository": {
				"name": "legacy",
				"full_name": "octo/legacy",
				"owner": {"login": "octo"},
				"default_branch": "trunk",
				"private": true,
				"archived": true,
				"topics": ["old"]
			},
			"installation": {"id": 5}
		});
		let event = WebhookNormalizer::new(None)
			.process_webhook(&headers("repository"), &serde_json::to_vec(&body).unwrap());

		assert_eq!(event.hook.status, HookStatus::Success);
		assert_eq!(event.hook.event, "repository");
		assert_eq!(event.hook.event_action, "archived");
		assert!(event.build.is_none());

		let repo = event.repo.unwrap();
		assert!(!repo.active);
		assert!(repo.private);
		assert_eq!(repo.branch, "trunk");
		assert_eq!(repo.install_id, 5);
	}

	#[test]
	fn custom_properties_replace_repository_values() {
		let body = json!({
			"action": "updated",
			"repository": {
				"name": "widgets",
				"full_name": "octo/widgets",
				"owner": {"login": "octo"},
				"custom_properties": {"team": "old"}
			},
			"new_property_values": [
				{"property_name": "team", "value": "platform"},
				{"property_name": "tier", "value": ["gold", "silver"]}
			]
		});
		let event = WebhookNormalizer::new(None)
			.process_webhook(&headers("custom_property_values"), &serde_json::to_vec(&body).unwrap());

		assert_eq!(event.hook.event, "custom_properties");
		let repo = event.repo.unwrap();
		assert_eq!(repo.custom_properties["team"], json!("platform"));
		assert_eq!(repo.custom_properties["tier"], json!(["gold", "silver"]));
		assert!(event.build.is_none());
	}
}

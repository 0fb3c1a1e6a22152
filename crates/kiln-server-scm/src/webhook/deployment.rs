// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use super::payload::DeploymentPayload;
use super::{convert_repo, hook_link, skipped, strip_branch};
use crate::types::{actions, events, Build, Deployment, Hook, NormalizedEvent};

/// Flatten a deployment payload into strings.
///
/// GitHub sends `{}` when no payload was given; anything that serializes to
/// two bytes or fewer is treated as absent. A payload sent as a JSON string
/// holding an object is decoded first. Non-string values are kept as JSON text.
pub(crate) fn flatten_payload(payload: &Value) -> BTreeMap<String, String> {
	let decoded;
	let object = match payload {
		Value::Object(map) => map,
		Value::String(raw) => match serde_json::from_str::<Value>(raw) {
			Ok(Value::Object(map)) => {
				decoded = map;
				&decoded
			}
			_ => return BTreeMap::new(),
		},
		_ => return BTreeMap::new(),
	};

	if serde_json::to_string(object).map(|s| s.len()).unwrap_or(0) <= 2 {
		return BTreeMap::new();
	}

	object
		.iter()
		.map(|(key, value)| {
			let value = match value {
				Value::String(s) => s.clone(),
				other => other.to_string(),
			};
			(key.clone(), value)
		})
		.collect()
}

pub(super) fn normalize(mut hook: Hook, payload: DeploymentPayload) -> NormalizedEvent {
	hook.event = events::DEPLOYMENT.to_string();
	hook.event_action = payload.action.clone();
	hook.link = hook_link(&hook.host, &payload.repository.full_name);

	if payload.action != actions::CREATED {
		return skipped(hook, format!("deployment action {} does not trigger builds", payload.action));
	}

	let repo = convert_repo(&payload.repository, payload.installation.as_ref());
	let deployment = &payload.deployment;
	let deploy_payload = flatten_payload(&deployment.payload);

	let mut git_ref = deployment.git_ref.clone();
	let mut branch = strip_branch(&deployment.git_ref).to_string();

	// GitHub sometimes reports the commit SHA (or a prefix of it) as the
	// deployment ref. There is no branch to build then, so use the default.
	if !git_ref.is_empty() && deployment.sha.starts_with(&git_ref) {
		debug!(deployment_ref = %git_ref, "deployment ref is a commit SHA, using default branch");
		git_ref = format!("refs/heads/{}", repo.branch);
		branch = repo.branch.clone();
	}

	let description = deployment.description.clone().unwrap_or_default();

	let build = Build {
		event: events::DEPLOYMENT.to_string(),
		event_action: payload.action.clone(),
		commit: deployment.sha.clone(),
		git_ref: git_ref.clone(),
		branch: branch.clone(),
		sender: payload.sender.login.clone(),
		sender_scm_id: payload.sender.id.to_string(),
		author: deployment.creator.login.clone(),
		email: deployment.creator.email.clone().unwrap_or_default(),
		clone: payload.repository.clone_url.clone(),
		source: deployment.url.clone(),
		title: format!("deployment received from {}", payload.repository.html_url),
		message: description.clone(),
		deploy: deployment.environment.clone(),
		deploy_number: deployment.id,
		deploy_payload: deploy_payload.clone(),
		..Default::default()
	};

	let record = Deployment {
		number: deployment.id,
		url: deployment.url.clone(),
		commit: deployment.sha.clone(),
		git_ref,
		task: deployment.task.clone(),
		target: deployment.environment.clone(),
		description,
		payload: deploy_payload,
		created_at: deployment.created_at.map(|t| t.timestamp()).unwrap_or(0),
		created_by: deployment.creator.login.clone(),
	};

	hook.branch = branch;

	NormalizedEvent {
		repo: Some(repo),
		build: Some(build),
		deployment: Some(record),
		..NormalizedEvent::hook_only(hook)
	}
}

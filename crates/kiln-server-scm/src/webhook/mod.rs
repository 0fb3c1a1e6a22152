// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Turns a raw GitHub delivery into a [`NormalizedEvent`].
//!
//! Normalization never fails. A delivery that cannot be read (bad content
//! type, bad signature, unparseable body, missing hook id) comes back as a
//! hook-only event with [`HookStatus::Error`] and the reason in `hook.error`,
//! so the caller can acknowledge it and still persist an audit record.

mod comment;
mod deployment;
mod installation;
mod merge_group;
pub mod payload;
mod pull_request;
mod push;
mod repository;

use chrono::Utc;
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use kiln_common_secret::SecretString;
use kiln_server_github_app::verify_webhook_signature;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::types::{Hook, HookStatus, NormalizedEvent, Repo};
use payload::{InstallationRef, RawEvent, Repository};

// Lowercase so they can be used with `HeaderMap::insert` as well as lookups.
pub const HEADER_DELIVERY: &str = "x-github-delivery";
pub const HEADER_HOOK_ID: &str = "x-github-hook-id";
pub const HEADER_EVENT: &str = "x-github-event";
pub const HEADER_ENTERPRISE_HOST: &str = "x-github-enterprise-host";
pub const HEADER_SIGNATURE: &str = "x-hub-signature-256";

pub const DEFAULT_HOST: &str = "github.com";

/// Why a delivery was degraded to a hook-only event.
#[derive(Debug, Error)]
pub enum ParseError {
	#[error("missing {0} header")]
	MissingHeader(&'static str),

	#[error("invalid hook id {0:?}")]
	InvalidHookId(String),

	#[error("unsupported content type {0:?}")]
	UnsupportedContentType(String),

	#[error("form body has no payload field")]
	MissingFormPayload,

	#[error("webhook signature verification failed")]
	InvalidSignature,

	#[error("unable to parse {event} payload: {source}")]
	Payload {
		event: String,
		#[source]
		source: serde_json::Error,
	},
}

pub struct WebhookNormalizer {
	webhook_secret: Option<SecretString>,
}

impl std::fmt::Debug for WebhookNormalizer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WebhookNormalizer")
			.field("verifies_signatures", &self.webhook_secret.is_some())
			.finish()
	}
}

impl WebhookNormalizer {
	/// With a secret, every delivery must carry a valid `X-Hub-Signature-256`.
	pub fn new(webhook_secret: Option<SecretString>) -> Self {
		Self {
			webhook_secret: webhook_secret.filter(|s| !s.is_blank()),
		}
	}

	#[instrument(
		skip(self, headers, body),
		fields(
			delivery_id = header(headers, HEADER_DELIVERY).unwrap_or_default(),
			event = header(headers, HEADER_EVENT).unwrap_or_default(),
		)
	)]
	pub fn process_webhook(&self, headers: &HeaderMap, body: &[u8]) -> NormalizedEvent {
		let mut hook = base_hook(headers);

		let event = match self.read(headers, body, &mut hook) {
			Ok(event) => event,
			Err(e) => return degrade(hook, e),
		};

		let normalized = match event {
			RawEvent::Push(p) => push::normalize(hook, p),
			RawEvent::PullRequest(p) => pull_request::normalize(hook, p),
			RawEvent::Deployment(p) => deployment::normalize(hook, p),
			RawEvent::IssueComment(p) => comment::normalize(hook, p),
			RawEvent::Repository(p) => repository::normalize(hook, p),
			RawEvent::CustomPropertyValues(p) => repository::normalize_custom_properties(hook, p),
			RawEvent::Installation(p) => installation::normalize(hook, p),
			RawEvent::InstallationRepositories(p) => installation::normalize_repositories(hook, p),
			RawEvent::MergeGroup(p) => merge_group::normalize(hook, p),
			RawEvent::Unknown { kind } => {
				debug!(event = %kind, "unhandled event type");
				skipped(hook, format!("event {kind} is not handled"))
			}
		};

		debug!(
			event = %normalized.hook.event,
			action = %normalized.hook.event_action,
			status = normalized.hook.status.as_str(),
			has_build = normalized.build.is_some(),
			"normalized webhook"
		);
		normalized
	}

	fn read(&self, headers: &HeaderMap, body: &[u8], hook: &mut Hook) -> Result<RawEvent, ParseError> {
		let kind = header(headers, HEADER_EVENT)
			.filter(|v| !v.is_empty())
			.ok_or(ParseError::MissingHeader(HEADER_EVENT))?;
		hook.event = kind.to_string();

		let raw_id = header(headers, HEADER_HOOK_ID).ok_or(ParseError::MissingHeader(HEADER_HOOK_ID))?;
		hook.webhook_id = raw_id
			.trim()
			.parse()
			.map_err(|_| ParseError::InvalidHookId(raw_id.to_string()))?;

		if let Some(secret) = &self.webhook_secret {
			let signature = header(headers, HEADER_SIGNATURE).unwrap_or_default();
			verify_webhook_signature(secret.expose().as_bytes(), signature, body)
				.map_err(|_| ParseError::InvalidSignature)?;
		}

		let json = payload_bytes(header(headers, CONTENT_TYPE.as_str()).unwrap_or_default(), body)?;
		let event = RawEvent::decode(kind, &json).map_err(|source| ParseError::Payload {
			event: kind.to_string(),
			source,
		})?;
		hook.event = event.hook_event().to_string();
		Ok(event)
	}
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|v| v.to_str().ok())
}

fn base_hook(headers: &HeaderMap) -> Hook {
	Hook {
		number: 0,
		source_id: header(headers, HEADER_DELIVERY).unwrap_or_default().to_string(),
		webhook_id: 0,
		event: String::new(),
		event_action: String::new(),
		created: Utc::now(),
		host: header(headers, HEADER_ENTERPRISE_HOST)
			.filter(|h| !h.is_empty())
			.unwrap_or(DEFAULT_HOST)
			.to_string(),
		status: HookStatus::Success,
		error: String::new(),
		link: String::new(),
		branch: String::new(),
	}
}

/// JSON body of a delivery, unwrapping the `payload` field of form posts.
fn payload_bytes(content_type: &str, body: &[u8]) -> Result<Vec<u8>, ParseError> {
	let media_type = content_type
		.split(';')
		.next()
		.unwrap_or_default()
		.trim()
		.to_ascii_lowercase();

	match media_type.as_str() {
		"application/json" => Ok(body.to_vec()),
		"application/x-www-form-urlencoded" => url::form_urlencoded::parse(body)
			.find(|(key, _)| key == "payload")
			.map(|(_, value)| value.into_owned().into_bytes())
			.ok_or(ParseError::MissingFormPayload),
		_ => Err(ParseError::UnsupportedContentType(content_type.to_string())),
	}
}

fn degrade(mut hook: Hook, error: ParseError) -> NormalizedEvent {
	warn!(
		delivery_id = %hook.source_id,
		event = %hook.event,
		error = %error,
		"degrading webhook delivery to hook-only"
	);
	hook.status = HookStatus::Error;
	hook.error = error.to_string();
	NormalizedEvent::hook_only(hook)
}

/// Recognized but intentionally ignored.
pub(crate) fn skipped(mut hook: Hook, reason: String) -> NormalizedEvent {
	hook.status = HookStatus::Skipped;
	hook.error = reason;
	NormalizedEvent::hook_only(hook)
}

pub(crate) fn hook_link(host: &str, full_name: &str) -> String {
	format!("https://{host}/{full_name}/settings/hooks")
}

/// Where an account's app installations are managed.
pub(crate) fn installation_link(host: &str, org: &str) -> String {
	format!("https://{host}/organizations/{org}/settings/installations")
}

pub(crate) fn strip_branch(git_ref: &str) -> &str {
	git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref)
}

/// Canonical repository from a payload's `repository` block. The
/// installation id comes from the top-level `installation` block.
pub(crate) fn convert_repo(repo: &Repository, installation: Option<&InstallationRef>) -> Repo {
	Repo {
		org: repo.owner.login.clone(),
		name: repo.name.clone(),
		full_name: repo.full_name.clone(),
		link: repo.html_url.clone(),
		clone: repo.clone_url.clone(),
		branch: repo.default_branch.clone(),
		private: repo.private,
		topics: repo.topics.iter().cloned().collect(),
		custom_properties: repo.custom_properties.clone(),
		install_id: installation.map(|i| i.id).unwrap_or(0),
		active: !repo.archived,
	}
}


#[cfg(test)]
mod tests {
	use super::test_support::headers;
	use super::*;
	use http::HeaderValue;
	use kiln_server_github_app::compute_webhook_signature;
	use proptest::prelude::*;
	use serde_json::json;

	fn push_body() -> Vec<u8> {
		serde_json::to_vec(&json!({
			"ref": "refs/heads/main",
			"before": "0000000000000000000000000000000000000001",
			"after": "9c93babf58917cd6f6f6772b5df2b098f507ff95",
			"head_commit": {
				"id": "9c93babf58917cd6f6f6772b5df2b098f507ff95",
				"message": "Update README.md",
				"author": {"name": "Octo", "email": "octo@example.com", "username": "octocat"}
			},
			"repository": {
				"name": "hello-world",
				"full_name": "octo/hello-world",
				"owner": {"login": "octo"},
				"html_url": "https://github.com/octo/hello-world",
				"clone_url": "https://github.com/octo/hello-world.git",
				"default_branch": "main"
			},
			"sender": {"id": 1, "login": "octocat"},
			"installation": {"id": 42}
		}))
		.unwrap()
	}

	#[test]
	fn unknown_event_is_skipped_hook_only() {
		let normalizer = WebhookNormalizer::new(None);
		let event = normalizer.process_webhook(&headers("star"), br#"{"action":"created"}"#);

		assert_eq!(event.hook.event, "star");
		assert_eq!(event.hook.status, HookStatus::Skipped);
		assert_eq!(event.hook.webhook_id, 123456);
		assert_eq!(event.hook.source_id, "d1b1c2e0-0000-11ef-8000-000000000001");
		assert!(event.build.is_none());
		assert!(event.repo.is_none());
	}

	#[test]
	fn garbage_body_degrades_to_error_hook() {
		let normalizer = WebhookNormalizer::new(None);
		let event = normalizer.process_webhook(&headers("push"), b"{not json");

		assert_eq!(event.hook.status, HookStatus::Error);
		assert!(event.hook.error.contains("unable to parse push payload"));
		assert!(event.build.is_none());
	}

	#[test]
	fn missing_hook_id_degrades() {
		let mut headers = headers("push");
		headers.remove(HEADER_HOOK_ID);
		let event = WebhookNormalizer::new(None).process_webhook(&headers, &push_body());

		assert_eq!(event.hook.status, HookStatus::Error);
		assert_eq!(event.hook.error, "missing x-github-hook-id header");
		assert_eq!(event.hook.event, "push");
	}

	#[test]
	fn non_numeric_hook_id_degrades() {
		let mut headers = headers("push");
		headers.insert(HEADER_HOOK_ID, HeaderValue::from_static("abc"));
		let event = WebhookNormalizer::new(None).process_webhook(&headers, &push_body());
		assert_eq!(event.hook.status, HookStatus::Error);
		assert!(event.hook.error.starts_with("invalid hook id"));
	}

	#[test]
	fn unsupported_content_type_degrades() {
		let mut headers = headers("push");
		headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
		let event = WebhookNormalizer::new(None).process_webhook(&headers, &push_body());
		assert_eq!(event.hook.status, HookStatus::Error);
		assert!(event.hook.error.contains("unsupported content type"));
	}

	#[test]
	fn form_encoded_payload_is_unwrapped() {
		let mut headers = headers("push");
		headers.insert(
			CONTENT_TYPE,
			HeaderValue::from_static("application/x-www-form-urlencoded"),
		);
		let json = String::from_utf8(push_body()).unwrap();
		let form: String = url::form_urlencoded::Serializer::new(String::new())
			.append_pair("payload", &json)
			.finish();

		let event = WebhookNormalizer::new(None).process_webhook(&headers, form.as_bytes());
		assert_eq!(event.hook.status, HookStatus::Success);
		assert_eq!(event.build.unwrap().branch, "main");
	}

	#[test]
	fn enterprise_host_is_used_for_links() {
		let mut headers = headers("push");
		headers.insert(HEADER_ENTERPRISE_HOST, HeaderValue::from_static("ghe.example.com"));
		let event = WebhookNormalizer::new(None).process_webhook(&headers, &push_body());

		assert_eq!(event.hook.host, "ghe.example.com");
		assert_eq!(event.hook.link, "https://ghe.example.com/octo/hello-world/settings/hooks");
	}

	#[test]
	fn signature_is_enforced_when_secret_configured() {
		let normalizer = WebhookNormalizer::new(Some(SecretString::from("hook-secret")));
		let body = push_body();

		let unsigned = normalizer.process_webhook(&headers("push"), &body);
		assert_eq!(unsigned.hook.status, HookStatus::Error);
		assert_eq!(unsigned.hook.error, "webhook signature verification failed");

		let mut signed = headers("push");
		signed.insert(
			HEADER_SIGNATURE,
			HeaderValue::from_str(&compute_webhook_signature(b"hook-secret", &body)).unwrap(),
		);
		let event = normalizer.process_webhook(&signed, &body);
		assert_eq!(event.hook.status, HookStatus::Success);
		assert_eq!(event.repo.unwrap().install_id, 42);
	}

	#[test]
	fn blank_secret_disables_verification() {
		let normalizer = WebhookNormalizer::new(Some(SecretString::from("  ")));
		let event = normalizer.process_webhook(&headers("push"), &push_body());
		assert_eq!(event.hook.status, HookStatus::Success);
	}

	proptest! {
		#[test]
		fn any_event_name_and_body_yields_a_hook(
			event in "[a-z_]{1,24}",
			body in proptest::collection::vec(any::<u8>(), 0..256),
		) {
			let normalized = WebhookNormalizer::new(None).process_webhook(&headers(&event), &body);
			prop_assert_eq!(normalized.hook.webhook_id, 123456);
			prop_assert!(!normalized.hook.event.is_empty());
		}

		#[test]
		fn unknown_events_never_carry_results(event in "x_[a-z]{1,16}") {
			let normalized = WebhookNormalizer::new(None).process_webhook(&headers(&event), b"{}");
			prop_assert_eq!(normalized.hook.status, HookStatus::Skipped);
			prop_assert!(normalized.build.is_none());
			prop_assert!(normalized.repo.is_none());
			prop_assert!(normalized.installation.is_none());
		}
	}
}

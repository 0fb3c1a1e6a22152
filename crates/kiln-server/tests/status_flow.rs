// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

mod common;

use chrono::Utc;
use common::{harness, legacy_harness, mount_token_exchange, INSTALLATION_ID};
use kiln_common_secret::SecretString;
use kiln_server::ServiceError;
use kiln_server_scm::{BuildState, BuildStatus, Hook, HookStatus, RepoRef, StepState};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SHA: &str = "6dcb09b5b57875f334f61aebed695e2e4193db5e";

fn build(install_id: i64, status: BuildStatus) -> BuildState {
	BuildState {
		id: 501,
		number: 12,
		event: "push".to_string(),
		status,
		commit: SHA.to_string(),
		deploy_number: 0,
		build_timeout_minutes: 60,
		repo: RepoRef {
			org: "octo".to_string(),
			name: "widgets".to_string(),
			full_name: "octo/widgets".to_string(),
			install_id,
		},
	}
}

#[tokio::test]
async fn installed_repo_reports_check_runs_through_installation_token() {
	let server = MockServer::start().await;
	mount_token_exchange(&server, INSTALLATION_ID).await;
	Mock::given(method("POST"))
		.and(path("/repos/octo/widgets/check-runs"))
		.and(header("authorization", "Bearer ghs_install"))
		.and(body_partial_json(json!({
			"name": "kiln/push",
			"head_sha": SHA,
			"details_url": "https://ci.example.com/octo/widgets/12"
		})))
		.respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9001})))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("PATCH"))
		.and(path("/repos/octo/widgets/check-runs/9001"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 9001})))
		.expect(1)
		.mount(&server)
		.await;

	let h = harness(&server);
	let cancel = CancellationToken::new();

	h.service
		.report_build(&build(INSTALLATION_ID, BuildStatus::Running), None, &cancel)
		.await
		.unwrap();
	h.service
		.report_build(&build(INSTALLATION_ID, BuildStatus::Success), None, &cancel)
		.await
		.unwrap();
}

#[tokio::test]
async fn unlinked_repo_reports_commit_status_with_legacy_token() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path(format!("/repos/octo/widgets/statuses/{SHA}")))
		.and(header("authorization", "Bearer gho_owner"))
		.and(body_partial_json(json!({
			"state": "success",
			"context": "kiln/push/lint"
		})))
		.respond_with(ResponseTemplate::new(201))
		.expect(1)
		.mount(&server)
		.await;

	let h = harness(&server);
	let step = StepState {
		id: 77,
		number: 2,
		name: "lint".to_string(),
		report_as: "lint".to_string(),
		status: BuildStatus::Success,
	};

	h.service
		.report_step(
			&build(0, BuildStatus::Running),
			&step,
			Some(&SecretString::from("gho_owner")),
			&CancellationToken::new(),
		)
		.await
		.unwrap();
}

#[tokio::test]
async fn without_app_every_repo_reports_commit_status_with_legacy_token() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path(format!("/repos/octo/widgets/statuses/{SHA}")))
		.and(header("authorization", "Bearer gho_owner"))
		.and(body_partial_json(json!({
			"state": "pending",
			"context": "kiln/push"
		})))
		.respond_with(ResponseTemplate::new(201))
		.expect(1)
		.mount(&server)
		.await;

	let h = legacy_harness(&server);
	let cancel = CancellationToken::new();
	assert!(h.service.credentials().app().is_none());

	h.service
		.report_build(
			&build(INSTALLATION_ID, BuildStatus::Running),
			Some(&SecretString::from("gho_owner")),
			&cancel,
		)
		.await
		.unwrap();

	let err = h
		.service
		.new_build_token(INSTALLATION_ID, &[], 60, &cancel)
		.await
		.unwrap_err();
	assert!(matches!(err, ServiceError::GithubApp(_)));

	let requests = server.received_requests().await.unwrap();
	assert!(requests.iter().all(|r| !r.url.path().contains("access_tokens")));
}

#[tokio::test]
async fn unlinked_repo_without_legacy_token_fails() {
	let server = MockServer::start().await;
	let h = harness(&server);

	let err = h
		.service
		.report_build(&build(0, BuildStatus::Pending), None, &CancellationToken::new())
		.await
		.unwrap_err();
	assert!(matches!(err, ServiceError::Report(_)));
}

#[tokio::test]
async fn redelivers_hook_through_installation_token() {
	let server = MockServer::start().await;
	mount_token_exchange(&server, INSTALLATION_ID).await;
	Mock::given(method("GET"))
		.and(path("/repos/octo/widgets/hooks/77/deliveries"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!([
			{"id": 1002, "guid": "72d3162e-cc78-11e3-81ab-4c9367dc0958", "event": "push"}
		])))
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/repos/octo/widgets/hooks/77/deliveries/1002/attempts"))
		.and(header("authorization", "Bearer ghs_install"))
		.respond_with(ResponseTemplate::new(202))
		.expect(1)
		.mount(&server)
		.await;

	let h = harness(&server);
	let hook = Hook {
		number: 3,
		source_id: "72d3162e-cc78-11e3-81ab-4c9367dc0958".to_string(),
		webhook_id: 77,
		event: "push".to_string(),
		event_action: String::new(),
		created: Utc::now(),
		host: "github.com".to_string(),
		status: HookStatus::Success,
		error: String::new(),
		link: "https://github.com/octo/widgets".to_string(),
		branch: "main".to_string(),
	};

	h.service
		.redeliver_hook(
			&build(INSTALLATION_ID, BuildStatus::Success).repo,
			&hook,
			None,
			&CancellationToken::new(),
		)
		.await
		.unwrap();
}

#[tokio::test]
async fn build_token_round_trip() {
	let server = MockServer::start().await;
	mount_token_exchange(&server, INSTALLATION_ID).await;

	let h = harness(&server);
	let token = h
		.service
		.new_build_token(
			INSTALLATION_ID,
			&["widgets".to_string()],
			60,
			&CancellationToken::new(),
		)
		.await
		.unwrap();

	let credentials = h.service.credentials();
	assert!(credentials.validate_build_token(&token.token).await.is_ok());
	credentials.revoke_build_token(&token.token).await.unwrap();
	assert!(credentials.validate_build_token(&token.token).await.is_err());
}

#[tokio::test]
async fn oauth_requires_configuration() {
	let server = MockServer::start().await;
	let h = harness(&server);

	assert!(matches!(
		h.service.authenticate("code").await,
		Err(ServiceError::OAuthNotConfigured)
	));
	assert!(matches!(
		h.service.authorization_url("state"),
		Err(ServiceError::OAuthNotConfigured)
	));
}

#[tokio::test]
async fn cancelled_report_is_reported_as_cancelled() {
	let server = MockServer::start().await;
	let h = harness(&server);
	let cancel = CancellationToken::new();
	cancel.cancel();

	let err = h
		.service
		.report_build(&build(INSTALLATION_ID, BuildStatus::Running), None, &cancel)
		.await
		.unwrap_err();
	assert!(err.is_cancelled(), "{err:?}");
}

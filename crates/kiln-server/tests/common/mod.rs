// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use kiln_common_secret::SecretString;
use kiln_server::ScmService;
use kiln_server_config::{finalize, ScmConfigLayer, ServerConfigLayer};
use kiln_server_github_app::{AppSigner, GithubAppClient, GithubAppConfig, GithubAppError};
use kiln_server_scm::{MemoryScmStore, Repo};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WEBHOOK_SECRET: &str = "kiln-webhook-secret";
pub const INSTALLATION_ID: i64 = 4242;

struct StaticSigner;

impl AppSigner for StaticSigner {
	fn app_id(&self) -> u64 {
		99
	}

	fn sign(&self) -> Result<SecretString, GithubAppError> {
		Ok(SecretString::from("app-assertion"))
	}
}

pub struct Harness {
	pub service: ScmService,
	pub store: Arc<MemoryScmStore>,
}

pub fn harness(server: &MockServer) -> Harness {
	let layer = ServerConfigLayer {
		scm: Some(ScmConfigLayer {
			web_address: Some("https://ci.example.com".to_string()),
			..Default::default()
		}),
		..Default::default()
	};
	let config = finalize(layer).unwrap();

	let app_config = GithubAppConfig::new(99, SecretString::from("unused"))
		.with_unchecked_base_url(url::Url::parse(&format!("{}/", server.uri())).unwrap())
		.with_webhook_secret(SecretString::from(WEBHOOK_SECRET));
	let app = Arc::new(GithubAppClient::new(app_config, Arc::new(StaticSigner)).unwrap());

	let store = Arc::new(MemoryScmStore::new());
	let service = ScmService::with_app_client(&config, store.clone(), app).unwrap();
	Harness { service, store }
}

/// A service with no GitHub App configured.
pub fn legacy_harness(server: &MockServer) -> Harness {
	let config = finalize(ServerConfigLayer::default()).unwrap();
	let client = GithubAppClient::without_app(url::Url::parse(&format!("{}/", server.uri())).unwrap())
		.unwrap();

	let store = Arc::new(MemoryScmStore::new());
	let service = ScmService::with_rest_client(&config, store.clone(), Arc::new(client)).unwrap();
	Harness { service, store }
}

pub fn repo(org: &str, name: &str) -> Repo {
	Repo {
		org: org.to_string(),
		name: name.to_string(),
		full_name: format!("{org}/{name}"),
		branch: "main".to_string(),
		active: true,
		..Default::default()
	}
}

pub async fn mount_token_exchange(server: &MockServer, installation_id: i64) {
	Mock::given(method("POST"))
		.and(path(format!("/app/installations/{installation_id}/access_tokens")))
		.respond_with(ResponseTemplate::new(201).set_body_json(json!({
			"token": "ghs_install",
			"expires_at": (Utc::now() + Duration::hours(1)).to_rfc3339(),
		})))
		.mount(server)
		.await;
}

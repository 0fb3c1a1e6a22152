// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub REST client for the endpoints the SCM layer needs.
//!
//! Every call takes a [`CancellationToken`]. When it fires the in-flight
//! request, or the read of its response body, is dropped and
//! [`GithubAppError::Cancelled`] is returned. Nothing is retried here.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kiln_common_secret::SecretString;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::GithubAppConfig;
use crate::error::GithubAppError;
use crate::jwt::AppSigner;
use crate::types::{
	AccessTokenRequest, AccessTokenResponse, CheckRunRequest, CheckRunResponse,
	CommitStatusRequest, DeploymentStatusRequest, HookDelivery, InstallationToken,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const API_VERSION: &str = "2022-11-28";
const DELIVERY_PAGE_SIZE: u32 = 100;

pub fn user_agent() -> String {
	format!("kiln/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Clone)]
pub struct GithubAppClient {
	http_client: Client,
	config: GithubAppConfig,
	signer: Arc<dyn AppSigner>,
}

impl std::fmt::Debug for GithubAppClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GithubAppClient")
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

impl GithubAppClient {
	pub fn new(config: GithubAppConfig, signer: Arc<dyn AppSigner>) -> Result<Self, GithubAppError> {
		let http_client = Client::builder()
			.user_agent(user_agent())
			.timeout(REQUEST_TIMEOUT)
			.build()
			.map_err(|e| GithubAppError::Config(format!("failed to create HTTP client: {e}")))?;

		info!(
			app_id = signer.app_id(),
			base_url = %config.base_url(),
			"created GitHub App client"
		);

		Ok(Self {
			http_client,
			config,
			signer,
		})
	}

	/// A client for calls made with user tokens only. Installation token
	/// exchange fails with [`GithubAppError::Config`]. `base_url` must
	/// already be validated.
	pub fn without_app(base_url: Url) -> Result<Self, GithubAppError> {
		let config = GithubAppConfig::new(0, SecretString::new(String::new()))
			.with_unchecked_base_url(base_url);
		Self::new(config, Arc::new(NoAppSigner))
	}

	pub fn config(&self) -> &GithubAppConfig {
		&self.config
	}

	fn url(&self, path: &str) -> Result<Url, GithubAppError> {
		self
			.config
			.base_url()
			.join(path)
			.map_err(|e| GithubAppError::Config(format!("invalid URL for {path}: {e}")))
	}

	fn repo_path(owner: &str, repo: &str, rest: &str) -> String {
		format!(
			"repos/{}/{}/{rest}",
			urlencoding::encode(owner),
			urlencoding::encode(repo)
		)
	}

	fn authorized(&self, request: RequestBuilder, bearer: &SecretString) -> RequestBuilder {
		request
			.bearer_auth(bearer.expose())
			.header("Accept", "application/vnd.github+json")
			.header("X-GitHub-Api-Version", API_VERSION)
	}

	/// Send a request, racing it against `cancel`. Non-2xx responses are
	/// mapped with [`map_github_error`].
	async fn send(
		&self,
		request: RequestBuilder,
		cancel: &CancellationToken,
	) -> Result<Response, GithubAppError> {
		let response = send_cancellable(request, cancel).await?;
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}

		let body = read_text(response, cancel).await?;
		Err(map_github_error(status, &body))
	}

	async fn json<T: DeserializeOwned>(
		response: Response,
		cancel: &CancellationToken,
	) -> Result<T, GithubAppError> {
		let parsed = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(GithubAppError::Cancelled),
			parsed = response.json() => parsed,
		};
		parsed.map_err(|e| {
			error!(error = %e, "failed to parse GitHub response");
			GithubAppError::InvalidResponse(format!("JSON parse error: {e}"))
		})
	}

	/// Exchange an app assertion for an installation token.
	///
	/// `repositories` narrows the token to named repositories; empty keeps
	/// the installation's full scope.
	#[instrument(skip(self, permissions, cancel))]
	pub async fn exchange_installation_token(
		&self,
		installation_id: i64,
		repositories: &[String],
		permissions: &BTreeMap<String, String>,
		cancel: &CancellationToken,
	) -> Result<InstallationToken, GithubAppError> {
		let assertion = self.signer.sign()?;
		let url = self.url(&format!("app/installations/{installation_id}/access_tokens"))?;
		let body = AccessTokenRequest {
			repositories: repositories.to_vec(),
			permissions: permissions.clone(),
		};

		let request = self.authorized(self.http_client.post(url), &assertion).json(&body);
		let response = send_cancellable(request, cancel).await?;

		let status = response.status();
		if !status.is_success() {
			let message = read_text(response, cancel).await?;
			warn!(status = status.as_u16(), "installation token exchange rejected");
			return Err(GithubAppError::Exchange {
				installation_id,
				status: status.as_u16(),
				message,
			});
		}

		let parsed: AccessTokenResponse = Self::json(response, cancel).await?;
		debug!(expires_at = %parsed.expires_at, "installation token issued");

		let repositories = if parsed.repositories.is_empty() {
			repositories.to_vec()
		} else {
			parsed.repositories.into_iter().map(|r| r.name).collect()
		};
		let permissions = if parsed.permissions.is_empty() {
			permissions.clone()
		} else {
			parsed.permissions
		};

		Ok(InstallationToken {
			token: SecretString::new(parsed.token),
			installation_id,
			repositories,
			permissions,
			expires_at: parsed.expires_at,
		})
	}

	#[instrument(skip(self, token, body, cancel), fields(context = %body.context))]
	pub async fn create_commit_status(
		&self,
		token: &SecretString,
		owner: &str,
		repo: &str,
		sha: &str,
		body: &CommitStatusRequest,
		cancel: &CancellationToken,
	) -> Result<(), GithubAppError> {
		let url = self.url(&Self::repo_path(owner, repo, &format!("statuses/{sha}")))?;
		let request = self.authorized(self.http_client.post(url), token).json(body);
		self.send(request, cancel).await?;
		Ok(())
	}

	/// Returns the id of the new check run.
	#[instrument(skip(self, token, body, cancel), fields(name = ?body.name))]
	pub async fn create_check_run(
		&self,
		token: &SecretString,
		owner: &str,
		repo: &str,
		body: &CheckRunRequest,
		cancel: &CancellationToken,
	) -> Result<i64, GithubAppError> {
		let url = self.url(&Self::repo_path(owner, repo, "check-runs"))?;
		let request = self.authorized(self.http_client.post(url), token).json(body);
		let response = self.send(request, cancel).await?;
		let created: CheckRunResponse = Self::json(response, cancel).await?;
		Ok(created.id)
	}

	#[instrument(skip(self, token, body, cancel))]
	pub async fn update_check_run(
		&self,
		token: &SecretString,
		owner: &str,
		repo: &str,
		check_run_id: i64,
		body: &CheckRunRequest,
		cancel: &CancellationToken,
	) -> Result<(), GithubAppError> {
		let url = self.url(&Self::repo_path(
			owner,
			repo,
			&format!("check-runs/{check_run_id}"),
		))?;
		let request = self.authorized(self.http_client.patch(url), token).json(body);
		self.send(request, cancel).await?;
		Ok(())
	}

	#[instrument(skip(self, token, body, cancel))]
	pub async fn create_deployment_status(
		&self,
		token: &SecretString,
		owner: &str,
		repo: &str,
		deployment_id: i64,
		body: &DeploymentStatusRequest,
		cancel: &CancellationToken,
	) -> Result<(), GithubAppError> {
		let url = self.url(&Self::repo_path(
			owner,
			repo,
			&format!("deployments/{deployment_id}/statuses"),
		))?;
		let request = self.authorized(self.http_client.post(url), token).json(body);
		self.send(request, cancel).await?;
		Ok(())
	}

	/// The most recent deliveries of a repository webhook.
	#[instrument(skip(self, token, cancel))]
	pub async fn list_hook_deliveries(
		&self,
		token: &SecretString,
		owner: &str,
		repo: &str,
		hook_id: i64,
		cancel: &CancellationToken,
	) -> Result<Vec<HookDelivery>, GithubAppError> {
		let mut url = self.url(&Self::repo_path(
			owner,
			repo,
			&format!("hooks/{hook_id}/deliveries"),
		))?;
		url
			.query_pairs_mut()
			.append_pair("per_page", &DELIVERY_PAGE_SIZE.to_string());

		let request = self.authorized(self.http_client.get(url), token);
		let response = self.send(request, cancel).await?;
		Self::json(response, cancel).await
	}

	/// Ask GitHub to redeliver the delivery with `guid`.
	///
	/// Only the last page of deliveries is searched; older deliveries fail
	/// with [`GithubAppError::RedeliveryUnavailable`].
	#[instrument(skip(self, token, cancel))]
	pub async fn redeliver_hook(
		&self,
		token: &SecretString,
		owner: &str,
		repo: &str,
		hook_id: i64,
		guid: &str,
		cancel: &CancellationToken,
	) -> Result<(), GithubAppError> {
		let deliveries = self
			.list_hook_deliveries(token, owner, repo, hook_id, cancel)
			.await?;

		let Some(delivery) = deliveries.iter().find(|d| d.guid == guid) else {
			return Err(GithubAppError::RedeliveryUnavailable {
				guid: guid.to_string(),
			});
		};

		let url = self.url(&Self::repo_path(
			owner,
			repo,
			&format!("hooks/{hook_id}/deliveries/{}/attempts", delivery.id),
		))?;
		let request = self.authorized(self.http_client.post(url), token);
		self.send(request, cancel).await?;

		info!(delivery_id = delivery.id, "requested webhook redelivery");
		Ok(())
	}
}

async fn send_cancellable(
	request: RequestBuilder,
	cancel: &CancellationToken,
) -> Result<Response, GithubAppError> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(GithubAppError::Cancelled),
		result = request.send() => result.map_err(|e| {
			error!(error = %e, "network error talking to GitHub");
			GithubAppError::Transport(e)
		}),
	}
}

/// Error bodies are informational; an unreadable one is treated as empty.
async fn read_text(response: Response, cancel: &CancellationToken) -> Result<String, GithubAppError> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(GithubAppError::Cancelled),
		text = response.text() => Ok(text.unwrap_or_default()),
	}
}

/// Stands in for the signer when no GitHub App is configured.
struct NoAppSigner;

impl AppSigner for NoAppSigner {
	fn app_id(&self) -> u64 {
		0
	}

	fn sign(&self) -> Result<SecretString, GithubAppError> {
		Err(GithubAppError::Config("no GitHub App is configured".to_string()))
	}
}

pub(crate) fn map_github_error(status: StatusCode, body: &str) -> GithubAppError {
	let status_code = status.as_u16();

	match status_code {
		401 => {
			warn!(status = status_code, "unauthorized request to GitHub");
			GithubAppError::Unauthorized
		}
		403 | 429 => {
			let lower = body.to_lowercase();
			if status_code == 429 || lower.contains("rate limit") {
				warn!(status = status_code, "GitHub rate limit exceeded");
				GithubAppError::RateLimited
			} else {
				warn!(status = status_code, "forbidden request to GitHub");
				GithubAppError::Forbidden
			}
		}
		404 => GithubAppError::NotFound(body.to_string()),
		_ => {
			error!(status = status_code, body = %body, "GitHub API error");
			GithubAppError::api_error(status_code, body)
		}
	}
}

#[cfg(test)]
pub(crate) mod test_support {
	use super::*;

	pub struct StaticSigner;

	impl AppSigner for StaticSigner {
		fn app_id(&self) -> u64 {
			99
		}

		fn sign(&self) -> Result<SecretString, GithubAppError> {
			Ok(SecretString::from("app-assertion"))
		}
	}

	pub fn client_for(server: &wiremock::MockServer) -> GithubAppClient {
		client_at(&server.uri())
	}

	pub fn client_at(base_url: &str) -> GithubAppClient {
		let config = GithubAppConfig::new(99, SecretString::from("unused"))
			.with_unchecked_base_url(Url::parse(base_url).unwrap());
		GithubAppClient::new(config, Arc::new(StaticSigner)).unwrap()
	}

	/// A local address nothing listens on.
	pub fn closed_port_url() -> String {
		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap();
		drop(listener);
		format!("http://{addr}/")
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! [`ScmService`]: every SCM component, wired from [`ServerConfig`].

use std::sync::Arc;

use http::HeaderMap;
use kiln_common_secret::SecretString;
use kiln_server_config::{OAuthConfig, ServerConfig};
use kiln_server_github_app::{
	CredentialManager, GitHubOAuthClient, GitHubOAuthConfig, GithubAppClient, GithubAppConfig,
	InstallTokenCache, InstallationToken, MemoryCacheBackend, RsaAppSigner, ScmIdentity,
};
use kiln_server_scm::{
	BuildState, Hook, InstallationReconciler, NormalizedEvent, RepoRef, ScmStore, StatusReporter,
	StatusSettings, StepState, WebhookNormalizer,
};
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::ServiceError;

pub struct ScmService {
	normalizer: WebhookNormalizer,
	reconciler: InstallationReconciler,
	reporter: StatusReporter,
	credentials: Arc<CredentialManager>,
	client: Arc<GithubAppClient>,
	oauth: Option<GitHubOAuthClient>,
}

impl std::fmt::Debug for ScmService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ScmService")
			.field("app_configured", &self.credentials.app().is_some())
			.field("base_url", &self.client.config().base_url().as_str())
			.field("oauth_configured", &self.oauth.is_some())
			.finish_non_exhaustive()
	}
}

impl ScmService {
	/// Build the service from configuration. Without a `[github_app]`
	/// section every repository is served with its legacy user token against
	/// `scm.api_url`.
	pub fn from_config(config: &ServerConfig, store: Arc<dyn ScmStore>) -> Result<Self, ServiceError> {
		let Some(app) = config.github_app.as_ref() else {
			let base_url = GithubAppConfig::validate_base_url(&config.scm.api_url)?;
			info!(api_url = %base_url, "no GitHub App configured, using legacy credentials only");
			let client = GithubAppClient::without_app(base_url)?;
			return Self::with_rest_client(config, store, Arc::new(client));
		};

		let signer = RsaAppSigner::from_pem(app.app_id(), app.private_key())?;
		let mut app_config = GithubAppConfig::new(app.app_id(), app.private_key().clone())
			.with_base_url(app.base_url().as_str())?
			.with_permissions(app.permissions().clone());
		if let Some(secret) = app.webhook_secret() {
			app_config = app_config.with_webhook_secret(secret.clone());
		}

		let client = GithubAppClient::new(app_config, Arc::new(signer))?;
		Self::with_app_client(config, store, Arc::new(client))
	}

	/// Wire everything around an already constructed App client.
	pub fn with_app_client(
		config: &ServerConfig,
		store: Arc<dyn ScmStore>,
		app: Arc<GithubAppClient>,
	) -> Result<Self, ServiceError> {
		Self::assemble(config, store, app, true)
	}

	/// Wire everything around a client with no App behind it, such as one
	/// from [`GithubAppClient::without_app`].
	pub fn with_rest_client(
		config: &ServerConfig,
		store: Arc<dyn ScmStore>,
		client: Arc<GithubAppClient>,
	) -> Result<Self, ServiceError> {
		Self::assemble(config, store, client, false)
	}

	fn assemble(
		config: &ServerConfig,
		store: Arc<dyn ScmStore>,
		client: Arc<GithubAppClient>,
		app_configured: bool,
	) -> Result<Self, ServiceError> {
		let token_key = match &config.cache.token_key {
			Some(key) => key.clone(),
			None => {
				warn!("no cache token key configured, build tokens will not survive a restart");
				generate_token_key()
			}
		};

		let cache = Arc::new(
			InstallTokenCache::new(Arc::new(MemoryCacheBackend::new()), token_key)
				.with_timeouts(config.cache.approval_timeout(), config.cache.grace()),
		);
		let credentials = Arc::new(
			CredentialManager::new(app_configured.then(|| client.clone()), cache)
				.with_legacy_fallback(config.scm.legacy_fallback),
		);

		let normalizer = WebhookNormalizer::new(client.config().webhook_secret().cloned());
		let reconciler = InstallationReconciler::new(store)
			.with_retry(config.reconcile.max_attempts, config.reconcile.backoff());

		let settings = StatusSettings {
			status_context: config.scm.status_context.clone(),
			web_address: config.scm.web_address.clone(),
			merge_group_contexts: config.scm.merge_group_contexts.clone(),
		};
		let reporter = StatusReporter::new(client.clone(), credentials.clone(), settings);

		let oauth = config.oauth.as_ref().map(oauth_client).transpose()?;

		info!(
			app_configured,
			app_id = client.config().app_id(),
			oauth_configured = oauth.is_some(),
			legacy_fallback = config.scm.legacy_fallback,
			"SCM service ready"
		);

		Ok(Self {
			normalizer,
			reconciler,
			reporter,
			credentials,
			client,
			oauth,
		})
	}

	pub fn credentials(&self) -> &Arc<CredentialManager> {
		&self.credentials
	}

	pub fn process_webhook(&self, headers: &HeaderMap, body: &[u8]) -> NormalizedEvent {
		self.normalizer.process_webhook(headers, body)
	}

	/// Apply the installation change carried by `event`, if any. Returns the
	/// number of repositories updated.
	pub async fn apply_installation(
		&self,
		event: &NormalizedEvent,
		cancel: &CancellationToken,
	) -> Result<usize, ServiceError> {
		let Some(installation) = &event.installation else {
			return Ok(0);
		};
		Ok(self.reconciler.apply(&event.hook, installation, cancel).await?)
	}

	pub async fn report_build(
		&self,
		build: &BuildState,
		legacy_token: Option<&SecretString>,
		cancel: &CancellationToken,
	) -> Result<(), ServiceError> {
		Ok(self.reporter.report_build(build, legacy_token, cancel).await?)
	}

	pub async fn report_step(
		&self,
		build: &BuildState,
		step: &StepState,
		legacy_token: Option<&SecretString>,
		cancel: &CancellationToken,
	) -> Result<(), ServiceError> {
		Ok(self
			.reporter
			.report_step(build, step, legacy_token, cancel)
			.await?)
	}

	/// Ask GitHub to send `hook` again.
	#[instrument(
		skip(self, repo, hook, legacy_token, cancel),
		fields(repo = %repo.full_name, delivery_id = %hook.source_id)
	)]
	pub async fn redeliver_hook(
		&self,
		repo: &RepoRef,
		hook: &Hook,
		legacy_token: Option<&SecretString>,
		cancel: &CancellationToken,
	) -> Result<(), ServiceError> {
		let credential = self
			.credentials
			.credential_for_repo(&repo.full_name, repo.install_id, legacy_token, cancel)
			.await?;

		self
			.client
			.redeliver_hook(
				credential.token(),
				&repo.org,
				&repo.name,
				hook.webhook_id,
				&hook.source_id,
				cancel,
			)
			.await?;
		Ok(())
	}

	/// Mint a repository-scoped token for one build.
	pub async fn new_build_token(
		&self,
		installation_id: i64,
		repositories: &[String],
		repo_timeout_minutes: u64,
		cancel: &CancellationToken,
	) -> Result<InstallationToken, ServiceError> {
		Ok(self
			.credentials
			.new_build_token(
				installation_id,
				repositories,
				self.client.config().permissions(),
				repo_timeout_minutes,
				cancel,
			)
			.await?)
	}

	pub fn authorization_url(&self, state: &str) -> Result<String, ServiceError> {
		Ok(self.oauth()?.authorization_url(state)?)
	}

	pub async fn authenticate(&self, code: &str) -> Result<ScmIdentity, ServiceError> {
		Ok(self.oauth()?.authenticate(code).await?)
	}

	fn oauth(&self) -> Result<&GitHubOAuthClient, ServiceError> {
		self.oauth.as_ref().ok_or(ServiceError::OAuthNotConfigured)
	}
}

fn oauth_client(config: &OAuthConfig) -> Result<GitHubOAuthClient, ServiceError> {
	Ok(GitHubOAuthClient::new(GitHubOAuthConfig {
		client_id: config.client_id.clone(),
		client_secret: config.client_secret.clone(),
		redirect_uri: config.redirect_uri.clone(),
		scopes: config.scopes.clone(),
		web_url: config.web_url.clone(),
		api_url: config.api_url.clone(),
	})?)
}

fn generate_token_key() -> SecretString {
	let mut key = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut key);
	SecretString::new(hex::encode(key))
}

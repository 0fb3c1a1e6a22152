// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub OAuth code exchange, reduced to the part the SCM layer needs: turn
//! an authorization code into a normalized [`ScmIdentity`].
//!
//! Session and cookie handling belong to the HTTP layer. Callers must still
//! validate the `state` parameter before calling [`GitHubOAuthClient::authenticate`].

use kiln_common_secret::SecretString;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use crate::client::user_agent;

pub const DEFAULT_WEB_URL: &str = "https://github.com/";
pub const DEFAULT_API_URL: &str = "https://api.github.com/";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
	#[error("HTTP request failed: {0}")]
	HttpRequest(#[from] reqwest::Error),

	#[error("failed to parse response: {0}")]
	Parse(String),

	#[error("GitHub OAuth error: {0}")]
	GitHub(String),

	#[error("invalid OAuth configuration: {0}")]
	Config(String),
}

#[derive(Debug, Clone)]
pub struct GitHubOAuthConfig {
	pub client_id: String,
	pub client_secret: SecretString,
	pub redirect_uri: String,
	pub scopes: Vec<String>,
	/// `https://github.com/` or the enterprise host.
	pub web_url: Url,
	/// `https://api.github.com/` or `https://<host>/api/v3/`.
	pub api_url: Url,
}

impl GitHubOAuthConfig {
	pub fn validate(&self) -> Result<(), OAuthError> {
		if self.client_id.is_empty() {
			return Err(OAuthError::Config("client_id cannot be empty".to_string()));
		}
		if self.client_secret.is_blank() {
			return Err(OAuthError::Config("client_secret cannot be empty".to_string()));
		}
		if self.redirect_uri.is_empty() {
			return Err(OAuthError::Config("redirect_uri cannot be empty".to_string()));
		}
		Ok(())
	}

	pub fn default_scopes() -> Vec<String> {
		vec!["repo".to_string(), "repo:status".to_string(), "user:email".to_string(), "read:org".to_string()]
	}
}

/// Who authenticated, as the rest of the server sees them.
#[derive(Debug, Clone)]
pub struct ScmIdentity {
	pub login: String,
	pub scm_id: i64,
	pub name: Option<String>,
	pub email: Option<String>,
	/// The user's OAuth token, kept as the legacy credential for their repositories.
	pub token: SecretString,
}

#[derive(Deserialize)]
struct TokenResponse {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
	pub id: i64,
	pub login: String,
	pub name: Option<String>,
	pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubEmail {
	pub email: String,
	pub primary: bool,
	pub verified: bool,
}

#[derive(Debug, Clone)]
pub struct GitHubOAuthClient {
	config: GitHubOAuthConfig,
	http_client: Client,
}

impl GitHubOAuthClient {
	pub fn new(config: GitHubOAuthConfig) -> Result<Self, OAuthError> {
		config.validate()?;
		let http_client = Client::builder().user_agent(user_agent()).build()?;
		Ok(Self {
			config,
			http_client,
		})
	}

	fn web(&self, path: &str) -> Result<Url, OAuthError> {
		self
			.config
			.web_url
			.join(path)
			.map_err(|e| OAuthError::Config(format!("invalid web URL: {e}")))
	}

	fn api(&self, path: &str) -> Result<Url, OAuthError> {
		self
			.config
			.api_url
			.join(path)
			.map_err(|e| OAuthError::Config(format!("invalid API URL: {e}")))
	}

	pub fn authorization_url(&self, state: &str) -> Result<String, OAuthError> {
		let mut url = self.web("login/oauth/authorize")?;
		url
			.query_pairs_mut()
			.append_pair("client_id", &self.config.client_id)
			.append_pair("redirect_uri", &self.config.redirect_uri)
			.append_pair("scope", &self.config.scopes.join(" "))
			.append_pair("state", state);
		Ok(url.to_string())
	}

	#[instrument(skip(self, code))]
	pub async fn exchange_code(&self, code: &str) -> Result<SecretString, OAuthError> {
		let response = self
			.http_client
			.post(self.web("login/oauth/access_token")?)
			.header("Accept", "application/json")
			.form(&[
				("client_id", self.config.client_id.as_str()),
				("client_secret", self.config.client_secret.expose().as_str()),
				("code", code),
				("redirect_uri", self.config.redirect_uri.as_str()),
			])
			.send()
			.await?;

		let body: TokenResponse = response
			.json()
			.await
			.map_err(|e| OAuthError::Parse(format!("token response: {e}")))?;

		if let Some(error) = body.error {
			return Err(OAuthError::GitHub(body.error_description.unwrap_or(error)));
		}

		body
			.access_token
			.map(SecretString::new)
			.ok_or_else(|| OAuthError::Parse("token response has no access_token".to_string()))
	}

	async fn get_json<T: serde::de::DeserializeOwned>(
		&self,
		path: &str,
		token: &SecretString,
	) -> Result<T, OAuthError> {
		let response = self
			.http_client
			.get(self.api(path)?)
			.bearer_auth(token.expose())
			.header("Accept", "application/vnd.github+json")
			.header("X-GitHub-Api-Version", "2022-11-28")
			.send()
			.await?;

		if !response.status().is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(OAuthError::GitHub(format!("GET {path} failed: {body}")));
		}

		response
			.json()
			.await
			.map_err(|e| OAuthError::Parse(format!("{path} response: {e}")))
	}

	pub async fn get_user(&self, token: &SecretString) -> Result<GitHubUser, OAuthError> {
		self.get_json("user", token).await
	}

	pub async fn get_emails(&self, token: &SecretString) -> Result<Vec<GitHubEmail>, OAuthError> {
		self.get_json("user/emails", token).await
	}

	/// Exchange `code` and resolve the identity behind it. When the profile
	/// email is hidden, the primary verified address is used.
	#[instrument(skip(self, code))]
	pub async fn authenticate(&self, code: &str) -> Result<ScmIdentity, OAuthError> {
		let token = self.exchange_code(code).await?;
		let user = self.get_user(&token).await?;

		let email = match user.email.filter(|e| !e.is_empty()) {
			Some(email) => Some(email),
			None => self
				.get_emails(&token)
				.await?
				.into_iter()
				.find(|e| e.primary && e.verified)
				.map(|e| e.email),
		};

		debug!(login = %user.login, "resolved GitHub identity");
		Ok(ScmIdentity {
			login: user.login,
			scm_id: user.id,
			name: user.name,
			email,
			token,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use wiremock::matchers::{body_string_contains, header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn config(server: Option<&MockServer>) -> GitHubOAuthConfig {
		let (web_url, api_url) = match server {
			Some(server) => {
				let base = Url::parse(&format!("{}/", server.uri())).unwrap();
				(base.clone(), base.join("api/v3/").unwrap())
			}
			None => (
				Url::parse(DEFAULT_WEB_URL).unwrap(),
				Url::parse(DEFAULT_API_URL).unwrap(),
			),
		};
		GitHubOAuthConfig {
			client_id: "Iv1.client".to_string(),
			client_secret: SecretString::from("shh"),
			redirect_uri: "https://ci.example.com/authenticate".to_string(),
			scopes: GitHubOAuthConfig::default_scopes(),
			web_url,
			api_url,
		}
	}

	#[test]
	fn authorization_url_carries_state_and_scopes() {
		let client = GitHubOAuthClient::new(config(None)).unwrap();
		let url = Url::parse(&client.authorization_url("csrf-123").unwrap()).unwrap();

		assert_eq!(url.host_str(), Some("github.com"));
		assert_eq!(url.path(), "/login/oauth/authorize");
		let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
		assert_eq!(pairs["state"], "csrf-123");
		assert_eq!(pairs["client_id"], "Iv1.client");
		assert!(pairs["scope"].contains("repo:status"));
	}

	#[test]
	fn empty_secret_is_rejected() {
		let mut config = config(None);
		config.client_secret = SecretString::from("");
		assert!(matches!(
			GitHubOAuthClient::new(config),
			Err(OAuthError::Config(_))
		));
	}

	#[tokio::test]
	async fn authenticate_falls_back_to_primary_verified_email() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/login/oauth/access_token"))
			.and(body_string_contains("code=abc"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"access_token": "gho_user",
				"token_type": "bearer",
				"scope": "repo"
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/api/v3/user"))
			.and(header("authorization", "Bearer gho_user"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"id": 583231,
				"login": "octocat",
				"name": "The Octocat",
				"email": null
			})))
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/api/v3/user/emails"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([
				{"email": "old@example.com", "primary": false, "verified": true},
				{"email": "octo@example.com", "primary": true, "verified": true}
			])))
			.mount(&server)
			.await;

		let identity = GitHubOAuthClient::new(config(Some(&server)))
			.unwrap()
			.authenticate("abc")
			.await
			.unwrap();

		assert_eq!(identity.login, "octocat");
		assert_eq!(identity.scm_id, 583231);
		assert_eq!(identity.email.as_deref(), Some("octo@example.com"));
		assert_eq!(identity.token.expose(), "gho_user");
	}

	#[tokio::test]
	async fn oauth_error_body_is_surfaced() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/login/oauth/access_token"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"error": "bad_verification_code",
				"error_description": "The code passed is incorrect or expired."
			})))
			.mount(&server)
			.await;

		let err = GitHubOAuthClient::new(config(Some(&server)))
			.unwrap()
			.authenticate("stale")
			.await
			.unwrap_err();

		assert!(matches!(err, OAuthError::GitHub(msg) if msg.contains("incorrect or expired")));
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub OAuth configuration section.

use kiln_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

const SECTION: &str = "oauth";
const DEFAULT_WEB_URL: &str = "https://github.com/";
const DEFAULT_API_URL: &str = "https://api.github.com/";

fn default_scopes() -> Vec<String> {
	["repo", "repo:status", "user:email", "read:org"]
		.into_iter()
		.map(str::to_string)
		.collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfigLayer {
	pub client_id: Option<String>,
	#[serde(skip_serializing)]
	pub client_secret: Option<SecretString>,
	pub redirect_uri: Option<String>,
	/// `https://github.com/` or the enterprise host.
	pub web_url: Option<String>,
	/// `https://api.github.com/` or `https://<host>/api/v3/`.
	pub api_url: Option<String>,
	pub scopes: Option<Vec<String>>,
}

impl OAuthConfigLayer {
	pub fn merge(&mut self, other: OAuthConfigLayer) {
		if other.client_id.is_some() {
			self.client_id = other.client_id;
		}
		if other.client_secret.is_some() {
			self.client_secret = other.client_secret;
		}
		if other.redirect_uri.is_some() {
			self.redirect_uri = other.redirect_uri;
		}
		if other.web_url.is_some() {
			self.web_url = other.web_url;
		}
		if other.api_url.is_some() {
			self.api_url = other.api_url;
		}
		if other.scopes.is_some() {
			self.scopes = other.scopes;
		}
	}

	/// `None` unless a client id is set; a client id without its secret or
	/// redirect URI is rejected.
	pub fn build(self) -> Result<Option<OAuthConfig>, ConfigError> {
		let Some(client_id) = self.client_id else {
			return Ok(None);
		};

		let client_secret = self
			.client_secret
			.filter(|s| !s.is_blank())
			.ok_or_else(|| ConfigError::validation(SECTION, "client_secret is required with client_id"))?;

		let redirect_uri = self
			.redirect_uri
			.ok_or_else(|| ConfigError::validation(SECTION, "redirect_uri is required with client_id"))?;

		Ok(Some(OAuthConfig {
			client_id,
			client_secret,
			redirect_uri,
			web_url: parse_url("oauth.web_url", self.web_url.as_deref().unwrap_or(DEFAULT_WEB_URL))?,
			api_url: parse_url("oauth.api_url", self.api_url.as_deref().unwrap_or(DEFAULT_API_URL))?,
			scopes: self.scopes.unwrap_or_else(default_scopes),
		}))
	}
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
		key: key.to_string(),
		message: e.to_string(),
	})
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
	pub client_id: String,
	pub client_secret: SecretString,
	pub redirect_uri: String,
	pub web_url: Url,
	pub api_url: Url,
	pub scopes: Vec<String>,
}

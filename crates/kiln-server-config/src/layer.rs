// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The partially-filled server config each source produces.

use serde::Deserialize;

use crate::sections::{
	CacheConfigLayer, GitHubAppConfigLayer, LoggingConfigLayer, OAuthConfigLayer,
	ReconcileConfigLayer, ScmConfigLayer,
};

/// One `[section]` per table in `server.toml`. Absent tables stay `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub github_app: Option<GitHubAppConfigLayer>,
	#[serde(default)]
	pub oauth: Option<OAuthConfigLayer>,
	#[serde(default)]
	pub scm: Option<ScmConfigLayer>,
	#[serde(default)]
	pub cache: Option<CacheConfigLayer>,
	#[serde(default)]
	pub reconcile: Option<ReconcileConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	/// Fields set in `other` win; unset fields keep the current value.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(
			&mut self.github_app,
			other.github_app,
			GitHubAppConfigLayer::merge,
		);
		merge_option(&mut self.oauth, other.oauth, OAuthConfigLayer::merge);
		merge_option(&mut self.scm, other.scm, ScmConfigLayer::merge);
		merge_option(&mut self.cache, other.cache, CacheConfigLayer::merge);
		merge_option(
			&mut self.reconcile,
			other.reconcile,
			ReconcileConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_layers_stay_empty() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer::default());
		assert!(base.scm.is_none());
		assert!(base.github_app.is_none());
	}

	#[test]
	fn later_layer_wins_per_field() {
		let mut base = ServerConfigLayer {
			scm: Some(ScmConfigLayer {
				status_context: Some("ci".to_string()),
				web_address: Some("https://ci.example.com".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		let other = ServerConfigLayer {
			scm: Some(ScmConfigLayer {
				status_context: Some("kiln-staging".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(other);

		let scm = base.scm.unwrap();
		assert_eq!(scm.status_context.as_deref(), Some("kiln-staging"));
		assert_eq!(scm.web_address.as_deref(), Some("https://ci.example.com"));
	}

	#[test]
	fn sections_from_both_layers_survive() {
		let mut base = ServerConfigLayer {
			reconcile: Some(ReconcileConfigLayer {
				max_attempts: Some(5),
				..Default::default()
			}),
			..Default::default()
		};
		let other = ServerConfigLayer {
			logging: Some(LoggingConfigLayer {
				level: Some("debug".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(other);

		assert_eq!(base.reconcile.unwrap().max_attempts, Some(5));
		assert_eq!(base.logging.unwrap().level.as_deref(), Some("debug"));
	}
}

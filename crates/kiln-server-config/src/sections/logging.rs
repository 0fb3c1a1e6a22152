// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `[logging]`: tracing filter and output format.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

fn default_level() -> String {
	"info".to_string()
}

/// `json` is meant for log shippers; `pretty` for terminals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
}

impl LogFormat {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogFormat::Pretty => "pretty",
			LogFormat::Json => "json",
		}
	}
}

impl FromStr for LogFormat {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"pretty" => Ok(LogFormat::Pretty),
			"json" => Ok(LogFormat::Json),
			_ => Err(()),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfigLayer {
	pub level: Option<String>,
	pub format: Option<LogFormat>,
}

impl LoggingConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.level.is_some() {
			self.level = other.level;
		}
		if other.format.is_some() {
			self.format = other.format;
		}
	}

	pub fn finalize(self) -> LoggingConfig {
		LoggingConfig {
			level: self.level.unwrap_or_else(default_level),
			format: self.format.unwrap_or_default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
	/// `EnvFilter` directive used when `RUST_LOG` is unset.
	pub level: String,
	pub format: LogFormat,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: default_level(),
			format: LogFormat::default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unset_layer_logs_info_pretty() {
		let config = LoggingConfigLayer::default().finalize();
		assert_eq!(config, LoggingConfig::default());
		assert_eq!(config.level, "info");
		assert_eq!(config.format, LogFormat::Pretty);
	}

	#[test]
	fn format_parses_case_insensitively() {
		assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
		assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
		assert!("xml".parse::<LogFormat>().is_err());
		assert_eq!(LogFormat::Json.as_str(), "json");
	}

	#[test]
	fn per_crate_filter_overrides_level() {
		let mut base = LoggingConfigLayer {
			level: Some("info".to_string()),
			format: Some(LogFormat::Json),
		};
		base.merge(LoggingConfigLayer {
			level: Some("kiln_server_scm=debug".to_string()),
			format: None,
		});
		assert_eq!(base.level.as_deref(), Some("kiln_server_scm=debug"));
		assert_eq!(base.format, Some(LogFormat::Json));
	}

	#[test]
	fn format_only_table_leaves_level_unset() {
		let layer: LoggingConfigLayer = toml::from_str(r#"format = "json""#).unwrap();
		assert!(layer.level.is_none());
		assert_eq!(layer.format, Some(LogFormat::Json));
	}
}

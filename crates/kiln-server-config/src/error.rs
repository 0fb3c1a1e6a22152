// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use kiln_common_secret::SecretEnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	/// An environment variable or TOML value that does not parse.
	#[error("invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },

	#[error("cannot read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("cannot parse config file {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	/// A section whose values parse but do not fit together.
	#[error("invalid [{section}] configuration: {message}")]
	Validation {
		section: &'static str,
		message: String,
	},

	#[error(transparent)]
	Secret(#[from] SecretEnvError),
}

impl ConfigError {
	pub(crate) fn validation(section: &'static str, message: impl Into<String>) -> Self {
		ConfigError::Validation {
			section,
			message: message.into(),
		}
	}
}

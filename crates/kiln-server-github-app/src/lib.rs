// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub App integration for Kiln.
//!
//! This crate owns everything that holds or derives a GitHub credential:
//!
//! - [`AppSigner`] / [`RsaAppSigner`]: short-lived RS256 app assertions
//! - [`GithubAppClient`]: token exchange plus the status, check-run,
//!   deployment-status and hook-delivery endpoints
//! - [`InstallationTransport`]: one installation's token with singleflight refresh
//! - [`CredentialManager`]: picks an installation token or the legacy user
//!   token for a repository
//! - [`InstallTokenCache`]: HMAC-keyed TTL cache for build tokens and check-run ids
//! - [`GitHubOAuthClient`]: OAuth code exchange producing an [`ScmIdentity`]

pub mod cache;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod jwt;
pub mod oauth;
pub mod signature;
pub mod transport;
pub mod types;

pub use cache::{CacheBackend, CacheError, CheckRunTarget, InstallTokenCache, MemoryCacheBackend};
pub use client::GithubAppClient;
pub use config::GithubAppConfig;
pub use credentials::{CredentialManager, ScmCredential};
pub use error::GithubAppError;
pub use jwt::{AppSigner, RsaAppSigner};
pub use oauth::{GitHubOAuthClient, GitHubOAuthConfig, OAuthError, ScmIdentity};
pub use signature::{compute_webhook_signature, verify_webhook_signature};
pub use transport::InstallationTransport;
pub use types::{
	CheckRunConclusion, CheckRunOutput, CheckRunRef, CheckRunRequest, CheckRunStatus,
	CommitState, CommitStatusRequest, DeploymentState, DeploymentStatusRequest, HookDelivery,
	InstallationToken,
};

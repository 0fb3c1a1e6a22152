// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Kiln server composition root.
//!
//! Loads nothing itself: callers obtain a [`kiln_server_config::ServerConfig`],
//! call [`telemetry::init_tracing`], then build an [`ScmService`] over their
//! [`kiln_server_scm::ScmStore`].

pub mod error;
pub mod service;
pub mod telemetry;

pub use error::ServiceError;
pub use service::ScmService;
pub use telemetry::init_tracing;

//! # selkie-supervisor
//!
//! The Selkie supervisor federates external identity providers (OIDC, LDAP,
//! Active Directory, GitHub) behind a single OAuth2/OIDC issuer so that
//! cluster clients can authenticate with upstream credentials.
//!
//! This crate implements the federation domain core:
//!
//! - A reconciler that watches FederationDomain and identity provider
//!   resources, validates issuer URLs and cross-domain constraints, compiles
//!   identity transformation pipelines, and publishes the resulting set of
//!   valid issuers.
//! - An atomically-swapped registry of resolved federation domains consumed
//!   by the HTTP layer.
//! - The `/oauth2/authorize` endpoint, serving both the browser-based
//!   redirect flow and the browserless header-credential flow through one
//!   request pipeline.
//! - A symmetric authenticated codec for the upstream `state` parameter and
//!   the CSRF double-submit cookie.
//!
//! ## Modules
//!
//! - [`config`] - Supervisor configuration
//! - [`resources`] - FederationDomain and identity provider resource model
//! - [`clients`] - Cluster read/status-write seam
//! - [`resolver`] - FederationDomain reconciliation and issuer construction
//! - [`registry`] - Published federation domain set
//! - [`providers`] - Resolved upstream identity provider capability
//! - [`oauth`] - OAuth2 request parsing, code issuance, response rendering
//! - [`state`] - Upstream state parameter and CSRF cookie codec
//! - [`http`] - Axum handlers for the authorization endpoint
//! - [`error`] - Authorization error types

pub mod clients;
pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod providers;
pub mod registry;
pub mod resolver;
pub mod resources;
pub mod state;

pub use config::SupervisorConfig;
pub use error::{AuthorizeError, AuthorizeResult};
pub use registry::FederationDomainRegistry;

//! Deterministic upstream provider for tests.
//!
//! Real upstream connections live behind per-protocol controllers outside
//! this crate; handler and reconciler tests register these static doubles
//! in the [`super::UpstreamProviderCache`] instead.

use std::collections::HashMap;

use async_trait::async_trait;
use url::Url;

use super::{
    LoginExtras, ProviderError, ProviderType, UpstreamAuthorizeRequestState, UpstreamIdentity,
    UpstreamProvider,
};

/// A canned upstream provider with a fixed authorize endpoint and a static
/// username/password table.
pub struct StaticUpstreamProvider {
    name: String,
    uid: String,
    provider_type: ProviderType,
    authorize_endpoint: Option<Url>,
    users: HashMap<String, (String, UpstreamIdentity)>,
    supports_password_grant: bool,
}

impl StaticUpstreamProvider {
    /// An OIDC-flavored provider with a browser flow and password grants.
    ///
    /// # Panics
    ///
    /// Panics when `authorize_endpoint` is not a valid URL; test fixtures
    /// pass literals.
    #[must_use]
    pub fn oidc(name: &str, uid: &str, authorize_endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            uid: uid.to_string(),
            provider_type: ProviderType::Oidc,
            authorize_endpoint: Some(
                Url::parse(authorize_endpoint).expect("fixture authorize endpoint must parse"),
            ),
            users: HashMap::new(),
            supports_password_grant: true,
        }
    }

    /// An LDAP-flavored provider: password grants only, no browser flow.
    #[must_use]
    pub fn ldap(name: &str, uid: &str) -> Self {
        Self {
            name: name.to_string(),
            uid: uid.to_string(),
            provider_type: ProviderType::Ldap,
            authorize_endpoint: None,
            users: HashMap::new(),
            supports_password_grant: true,
        }
    }

    /// Disable the password grant, leaving only the browser flow.
    #[must_use]
    pub fn without_password_grant(mut self) -> Self {
        self.supports_password_grant = false;
        self
    }

    /// Register a user the provider will accept.
    #[must_use]
    pub fn with_user(mut self, username: &str, password: &str, groups: &[&str]) -> Self {
        let identity = UpstreamIdentity {
            upstream_username: username.to_string(),
            upstream_groups: groups.iter().map(|g| (*g).to_string()).collect(),
            subject: format!("{}/{}", self.name, username),
        };
        self.users
            .insert(username.to_string(), (password.to_string(), identity));
        self
    }
}

#[async_trait]
impl UpstreamProvider for StaticUpstreamProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn uid(&self) -> &str {
        &self.uid
    }

    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    fn upstream_authorize_redirect_url(
        &self,
        state: &UpstreamAuthorizeRequestState,
        downstream_issuer: &str,
    ) -> Result<Url, ProviderError> {
        let Some(endpoint) = &self.authorize_endpoint else {
            return Err(ProviderError::FlowUnsupported { flow: "browser" });
        };

        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", "supervisor-client")
            .append_pair("redirect_uri", &format!("{downstream_issuer}/callback"))
            .append_pair("scope", "openid email profile groups")
            .append_pair("state", &state.encoded_state_param)
            .append_pair("nonce", state.nonce.as_str())
            .append_pair("code_challenge", &state.pkce.challenge())
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    async fn login(
        &self,
        username: &str,
        password: &str,
        ignore_groups: bool,
    ) -> Result<(UpstreamIdentity, LoginExtras), ProviderError> {
        if !self.supports_password_grant {
            return Err(ProviderError::FlowUnsupported {
                flow: "username/password",
            });
        }

        let (expected_password, identity) = self
            .users
            .get(username)
            .ok_or(ProviderError::InvalidCredentials)?;
        if expected_password != password {
            return Err(ProviderError::InvalidCredentials);
        }

        let mut identity = identity.clone();
        if ignore_groups {
            identity.upstream_groups.clear();
        }
        Ok((identity, LoginExtras::default()))
    }
}

//! Validated federation domain issuers.
//!
//! A [`FederationDomainIssuer`] is the reconciler's output for one valid
//! FederationDomain: a validated issuer URL plus the set of identity
//! providers the domain exposes. Issuers are value objects rebuilt from
//! scratch on every reconcile and never mutated in place.

use std::sync::Arc;

use url::Url;

use selkie_transform::TransformationPipeline;

use crate::providers::ProviderType;

/// Errors from the issuer constructors.
///
/// These surface on the FederationDomain status: URL problems under the
/// `IssuerURLValid` condition, display-name duplication under
/// `IdentityProvidersFound`.
#[derive(Debug, thiserror::Error)]
pub enum IssuerError {
    /// The issuer string is not a parseable URL.
    #[error("spec.issuer could not be parsed as a URL: {0}")]
    Parse(#[from] url::ParseError),

    /// The issuer URL scheme is not `https`.
    #[error("spec.issuer must use the https scheme, found {scheme:?}")]
    SchemeNotHttps {
        /// The scheme that was found.
        scheme: String,
    },

    /// The issuer URL has no host.
    #[error("spec.issuer must include a hostname")]
    MissingHost,

    /// The issuer URL carries a query or fragment.
    #[error("spec.issuer must not include a query or fragment")]
    HasQueryOrFragment,

    /// Two identity providers in one domain share a display name.
    #[error("identity provider display names must be unique within a FederationDomain: duplicate {display_name:?}")]
    DuplicateDisplayName {
        /// The repeated display name.
        display_name: String,
    },
}

/// One identity provider as exposed by a federation domain: its display
/// name, the UID of the backing resource, and the compiled transformation
/// pipeline.
#[derive(Clone)]
pub struct FederationDomainIdentityProvider {
    /// Display name, unique within the domain.
    pub display_name: String,

    /// UID of the identity provider resource.
    pub uid: String,

    /// Protocol family of the backing resource.
    pub provider_type: ProviderType,

    /// Compiled transformation pipeline, shared across logins.
    pub transforms: Arc<TransformationPipeline>,
}

impl std::fmt::Debug for FederationDomainIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationDomainIdentityProvider")
            .field("display_name", &self.display_name)
            .field("uid", &self.uid)
            .field("provider_type", &self.provider_type)
            .finish_non_exhaustive()
    }
}

/// A validated issuer and its identity providers, ready for publication.
#[derive(Clone)]
pub struct FederationDomainIssuer {
    issuer: Url,
    issuer_key: String,
    hostname_key: String,
    providers: Vec<FederationDomainIdentityProvider>,
    in_backwards_compat_mode: bool,
}

impl std::fmt::Debug for FederationDomainIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationDomainIssuer")
            .field("issuer", &self.issuer)
            .field("issuer_key", &self.issuer_key)
            .field("hostname_key", &self.hostname_key)
            .field("providers", &self.providers)
            .field("in_backwards_compat_mode", &self.in_backwards_compat_mode)
            .finish()
    }
}

impl FederationDomainIssuer {
    /// Build an issuer from an explicit identity provider list.
    ///
    /// The list may be empty; such a domain serves its discovery endpoints
    /// but can authenticate nobody.
    ///
    /// # Errors
    ///
    /// Returns an [`IssuerError`] when the issuer URL fails validation or
    /// two providers share a display name.
    pub fn new(
        issuer: &str,
        providers: Vec<FederationDomainIdentityProvider>,
    ) -> Result<Self, IssuerError> {
        Self::build(issuer, providers, false)
    }

    /// Build an issuer in legacy back-compat mode: the single identity
    /// provider in the namespace, adopted as the domain's default.
    ///
    /// # Errors
    ///
    /// Returns an [`IssuerError`] when the issuer URL fails validation.
    pub fn with_default_provider(
        issuer: &str,
        default_provider: FederationDomainIdentityProvider,
    ) -> Result<Self, IssuerError> {
        Self::build(issuer, vec![default_provider], true)
    }

    fn build(
        issuer: &str,
        providers: Vec<FederationDomainIdentityProvider>,
        in_backwards_compat_mode: bool,
    ) -> Result<Self, IssuerError> {
        let issuer = validate_issuer_url(issuer)?;

        for (i, provider) in providers.iter().enumerate() {
            if providers[..i]
                .iter()
                .any(|other| other.display_name == provider.display_name)
            {
                return Err(IssuerError::DuplicateDisplayName {
                    display_name: provider.display_name.clone(),
                });
            }
        }

        let issuer_key = issuer_url_to_issuer_key(&issuer);
        let hostname_key = issuer_url_to_hostname_key(&issuer);
        Ok(Self {
            issuer,
            issuer_key,
            hostname_key,
            providers,
            in_backwards_compat_mode,
        })
    }

    /// The validated issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    /// The issuer string without a trailing slash, as served in discovery
    /// documents.
    #[must_use]
    pub fn issuer_str(&self) -> &str {
        self.issuer.as_str().trim_end_matches('/')
    }

    /// Key identifying this issuer across domains:
    /// `scheme://lowercase(host[:port])/path`.
    #[must_use]
    pub fn issuer_key(&self) -> &str {
        &self.issuer_key
    }

    /// Key identifying the issuer's TLS identity: the lowercase hostname
    /// without the port.
    #[must_use]
    pub fn hostname_key(&self) -> &str {
        &self.hostname_key
    }

    /// The providers this domain exposes, in declaration order.
    #[must_use]
    pub fn providers(&self) -> &[FederationDomainIdentityProvider] {
        &self.providers
    }

    /// The adopted default provider, present only in back-compat mode.
    #[must_use]
    pub fn default_provider(&self) -> Option<&FederationDomainIdentityProvider> {
        self.in_backwards_compat_mode
            .then(|| self.providers.first())
            .flatten()
    }

    /// Look up a provider by its display name.
    #[must_use]
    pub fn provider_by_display_name(
        &self,
        display_name: &str,
    ) -> Option<&FederationDomainIdentityProvider> {
        self.providers
            .iter()
            .find(|p| p.display_name == display_name)
    }
}

/// Validate a `spec.issuer` string.
///
/// # Errors
///
/// Returns an [`IssuerError`] unless the string is an absolute `https` URL
/// with a host and without query or fragment.
pub fn validate_issuer_url(issuer: &str) -> Result<Url, IssuerError> {
    let url = Url::parse(issuer)?;

    if url.scheme() != "https" {
        return Err(IssuerError::SchemeNotHttps {
            scheme: url.scheme().to_string(),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(IssuerError::MissingHost);
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(IssuerError::HasQueryOrFragment);
    }

    Ok(url)
}

/// Cross-domain identity of an issuer: `scheme://lowercase(host[:port])/path`.
#[must_use]
pub fn issuer_url_to_issuer_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    match url.port() {
        Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, url.path()),
        None => format!("{}://{}{}", url.scheme(), host, url.path()),
    }
}

/// TLS identity of an issuer: the lowercase hostname, port excluded,
/// because SNI carries no port.
#[must_use]
pub fn issuer_url_to_hostname_key(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_transform::{TransformEngine, TransformEngineConfig, TransformationConstants};

    fn provider(display_name: &str, uid: &str) -> FederationDomainIdentityProvider {
        let engine = Arc::new(TransformEngine::new(TransformEngineConfig::default()));
        FederationDomainIdentityProvider {
            display_name: display_name.to_string(),
            uid: uid.to_string(),
            provider_type: ProviderType::Oidc,
            transforms: Arc::new(TransformationPipeline::new(
                engine,
                TransformationConstants::new(),
            )),
        }
    }

    #[test]
    fn test_valid_issuer() {
        let issuer = FederationDomainIssuer::new(
            "https://Issuer.Example.COM:8443/demo",
            vec![provider("a", "u1"), provider("b", "u2")],
        )
        .unwrap();

        assert_eq!(issuer.issuer_key(), "https://issuer.example.com:8443/demo");
        assert_eq!(issuer.hostname_key(), "issuer.example.com");
        assert_eq!(issuer.providers().len(), 2);
        assert!(issuer.default_provider().is_none());
        assert!(issuer.provider_by_display_name("b").is_some());
        assert!(issuer.provider_by_display_name("c").is_none());
    }

    #[test]
    fn test_issuer_str_trims_trailing_slash() {
        let issuer = FederationDomainIssuer::new("https://issuer.example.com", vec![]).unwrap();
        assert_eq!(issuer.issuer_str(), "https://issuer.example.com");
    }

    #[test]
    fn test_issuer_url_validation() {
        assert!(matches!(
            validate_issuer_url("not a url"),
            Err(IssuerError::Parse(_))
        ));
        assert!(matches!(
            validate_issuer_url("http://issuer.example.com"),
            Err(IssuerError::SchemeNotHttps { .. })
        ));
        assert!(matches!(
            validate_issuer_url("https://issuer.example.com/path?x=1"),
            Err(IssuerError::HasQueryOrFragment)
        ));
        assert!(matches!(
            validate_issuer_url("https://issuer.example.com/path#frag"),
            Err(IssuerError::HasQueryOrFragment)
        ));
        assert!(validate_issuer_url("https://issuer.example.com/path").is_ok());
    }

    #[test]
    fn test_duplicate_display_names_rejected() {
        let err = FederationDomainIssuer::new(
            "https://issuer.example.com",
            vec![provider("same", "u1"), provider("same", "u2")],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            IssuerError::DuplicateDisplayName { display_name } if display_name == "same"
        ));
    }

    #[test]
    fn test_backwards_compat_mode_has_default() {
        let issuer = FederationDomainIssuer::with_default_provider(
            "https://issuer.example.com",
            provider("corp-ldap", "u1"),
        )
        .unwrap();

        assert_eq!(issuer.default_provider().unwrap().display_name, "corp-ldap");
        assert_eq!(issuer.providers().len(), 1);
    }
}

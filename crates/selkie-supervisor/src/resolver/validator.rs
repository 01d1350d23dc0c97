//! Cross-domain configuration validation.
//!
//! Some FederationDomain constraints only make sense over the whole
//! collection: issuer URLs must be unique, and every domain sharing one
//! issuer hostname must agree on the TLS serving Secret (SNI carries no
//! port, so one address can present only one certificate). The validator
//! indexes the full list once per reconcile, then answers per-domain.

use std::collections::{HashMap, HashSet};

use url::Url;

use super::condition_reasons as reasons;
use super::condition_types as types;
use super::issuer::{issuer_url_to_hostname_key, issuer_url_to_issuer_key};
use crate::resources::{Condition, ConditionStatus, FederationDomain};

/// Index over every FederationDomain, built once per reconcile pass.
pub struct CrossDomainConfigValidator {
    issuer_counts: HashMap<String, usize>,
    secret_names_per_issuer_hostname: HashMap<String, HashSet<String>>,
}

impl CrossDomainConfigValidator {
    /// Index the given collection of domains.
    ///
    /// Unparseable issuer URLs are skipped here; [`Self::validate`] reports
    /// them as `Unknown` conditions and the URL-shaped validation proper is
    /// handled by the issuer constructor.
    #[must_use]
    pub fn new(federation_domains: &[FederationDomain]) -> Self {
        let mut issuer_counts: HashMap<String, usize> = HashMap::new();
        let mut secret_names_per_issuer_hostname: HashMap<String, HashSet<String>> = HashMap::new();

        for domain in federation_domains {
            let Ok(issuer_url) = Url::parse(&domain.spec.issuer) else {
                continue;
            };

            *issuer_counts
                .entry(issuer_url_to_issuer_key(&issuer_url))
                .or_default() += 1;

            let secret_names = secret_names_per_issuer_hostname
                .entry(issuer_url_to_hostname_key(&issuer_url))
                .or_default();
            if let Some(tls) = &domain.spec.tls {
                secret_names.insert(tls.secret_name.clone());
            }
        }

        Self {
            issuer_counts,
            secret_names_per_issuer_hostname,
        }
    }

    /// Append the cross-domain conditions for one domain.
    pub fn validate(&self, domain: &FederationDomain, conditions: &mut Vec<Condition>) {
        let Ok(issuer_url) = Url::parse(&domain.spec.issuer) else {
            // The issuer constructor reports the URL problem itself; here we
            // can only say the cross-domain checks were not possible.
            conditions.push(Condition::new(
                types::ISSUER_IS_UNIQUE,
                ConditionStatus::Unknown,
                reasons::UNABLE_TO_VALIDATE,
                "unable to check if spec.issuer is unique among all FederationDomains because URL cannot be parsed",
            ));
            conditions.push(Condition::new(
                types::ONE_TLS_SECRET_PER_ISSUER_HOSTNAME,
                ConditionStatus::Unknown,
                reasons::UNABLE_TO_VALIDATE,
                "unable to check if all FederationDomains are using the same TLS secret when using the same hostname in the spec.issuer URL because URL cannot be parsed",
            ));
            return;
        };

        let issuer_count = self
            .issuer_counts
            .get(&issuer_url_to_issuer_key(&issuer_url))
            .copied()
            .unwrap_or_default();
        if issuer_count > 1 {
            conditions.push(Condition::new(
                types::ISSUER_IS_UNIQUE,
                ConditionStatus::False,
                reasons::DUPLICATE_ISSUER,
                "multiple FederationDomains have the same spec.issuer URL: these URLs must be unique (can use different hosts or paths)",
            ));
        } else {
            conditions.push(Condition::new(
                types::ISSUER_IS_UNIQUE,
                ConditionStatus::True,
                reasons::SUCCESS,
                "spec.issuer is unique among all FederationDomains",
            ));
        }

        let secret_count = self
            .secret_names_per_issuer_hostname
            .get(&issuer_url_to_hostname_key(&issuer_url))
            .map(HashSet::len)
            .unwrap_or_default();
        if secret_count > 1 {
            conditions.push(Condition::new(
                types::ONE_TLS_SECRET_PER_ISSUER_HOSTNAME,
                ConditionStatus::False,
                reasons::DIFFERENT_SECRET_REFS_FOUND,
                "when different FederationDomains are using the same hostname in the spec.issuer URL then they must also use the same TLS secretRef: different secretRefs found",
            ));
        } else {
            conditions.push(Condition::new(
                types::ONE_TLS_SECRET_PER_ISSUER_HOSTNAME,
                ConditionStatus::True,
                reasons::SUCCESS,
                "all FederationDomains are using the same TLS secret when using the same hostname in the spec.issuer URL",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{FederationDomainSpec, FederationDomainTlsSpec, ObjectMeta};

    fn domain(name: &str, issuer: &str, secret: Option<&str>) -> FederationDomain {
        FederationDomain {
            metadata: ObjectMeta::named("supervisor", name),
            spec: FederationDomainSpec {
                issuer: issuer.to_string(),
                tls: secret.map(|s| FederationDomainTlsSpec {
                    secret_name: s.to_string(),
                }),
                identity_providers: vec![],
            },
            status: Default::default(),
        }
    }

    fn condition<'a>(conditions: &'a [Condition], type_name: &str) -> &'a Condition {
        conditions
            .iter()
            .find(|c| c.type_name == type_name)
            .unwrap_or_else(|| panic!("missing condition {type_name}"))
    }

    fn validate(all: &[FederationDomain], target: &FederationDomain) -> Vec<Condition> {
        let mut conditions = Vec::new();
        CrossDomainConfigValidator::new(all).validate(target, &mut conditions);
        conditions
    }

    #[test]
    fn test_unique_issuers_pass() {
        let domains = vec![
            domain("a", "https://issuer.example.com/a", None),
            domain("b", "https://issuer.example.com/b", None),
        ];
        let conditions = validate(&domains, &domains[0]);

        assert_eq!(
            condition(&conditions, types::ISSUER_IS_UNIQUE).status,
            ConditionStatus::True
        );
        assert_eq!(
            condition(&conditions, types::ONE_TLS_SECRET_PER_ISSUER_HOSTNAME).status,
            ConditionStatus::True
        );
    }

    #[test]
    fn test_duplicate_issuers_flagged_on_every_domain() {
        // Same issuer key despite host-case differences.
        let domains = vec![
            domain("a", "https://ISSUER.example.com/demo", None),
            domain("b", "https://issuer.example.com/demo", None),
        ];

        for target in &domains {
            let conditions = validate(&domains, target);
            let c = condition(&conditions, types::ISSUER_IS_UNIQUE);
            assert_eq!(c.status, ConditionStatus::False);
            assert_eq!(c.reason, reasons::DUPLICATE_ISSUER);
        }
    }

    #[test]
    fn test_differing_paths_are_distinct_issuers() {
        let domains = vec![
            domain("a", "https://issuer.example.com/a", None),
            domain("b", "https://issuer.example.com/A", None),
        ];
        // Paths are case-sensitive, so these are distinct issuers.
        let conditions = validate(&domains, &domains[0]);
        assert_eq!(
            condition(&conditions, types::ISSUER_IS_UNIQUE).status,
            ConditionStatus::True
        );
    }

    #[test]
    fn test_conflicting_tls_secrets_per_hostname() {
        // Different ports share a TLS identity; the secret names disagree.
        let domains = vec![
            domain("a", "https://issuer.example.com/a", Some("cert-one")),
            domain("b", "https://issuer.example.com:8443/b", Some("cert-two")),
        ];

        for target in &domains {
            let conditions = validate(&domains, target);
            let c = condition(&conditions, types::ONE_TLS_SECRET_PER_ISSUER_HOSTNAME);
            assert_eq!(c.status, ConditionStatus::False);
            assert_eq!(c.reason, reasons::DIFFERENT_SECRET_REFS_FOUND);
        }
    }

    #[test]
    fn test_agreeing_tls_secrets_pass() {
        let domains = vec![
            domain("a", "https://issuer.example.com/a", Some("cert")),
            domain("b", "https://issuer.example.com/b", Some("cert")),
            domain("c", "https://issuer.example.com/c", None),
        ];
        let conditions = validate(&domains, &domains[2]);
        assert_eq!(
            condition(&conditions, types::ONE_TLS_SECRET_PER_ISSUER_HOSTNAME).status,
            ConditionStatus::True
        );
    }

    #[test]
    fn test_unparseable_issuer_yields_unknown() {
        let domains = vec![domain("a", "https://issuer example com", None)];
        let conditions = validate(&domains, &domains[0]);

        let c = condition(&conditions, types::ISSUER_IS_UNIQUE);
        assert_eq!(c.status, ConditionStatus::Unknown);
        assert_eq!(c.reason, reasons::UNABLE_TO_VALIDATE);

        let c = condition(&conditions, types::ONE_TLS_SECRET_PER_ISSUER_HOSTNAME);
        assert_eq!(c.status, ConditionStatus::Unknown);
    }
}

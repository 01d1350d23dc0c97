//! Supervisor configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root supervisor configuration.
///
/// # Example (TOML)
///
/// ```toml
/// namespace = "supervisor"
///
/// [transforms]
/// evaluation_budget = "5s"
///
/// [oauth]
/// authorization_code_lifetime = "10m"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Namespace the supervisor watches for its custom resources.
    pub namespace: String,

    /// Identity transformation settings.
    pub transforms: TransformConfig,

    /// OAuth2 settings for the downstream authorization server.
    pub oauth: OAuthConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            namespace: "supervisor".to_string(),
            transforms: TransformConfig::default(),
            oauth: OAuthConfig::default(),
        }
    }
}

/// Identity transformation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Wall-clock budget shared by one pipeline evaluation.
    /// Logins whose transformations run longer are denied.
    #[serde(with = "humantime_serde")]
    pub evaluation_budget: Duration,

    /// Engine operation cap per expression evaluation.
    pub max_operations: u64,

    /// Engine call-depth cap per expression evaluation.
    pub max_call_levels: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            evaluation_budget: Duration::from_secs(5),
            max_operations: 500_000,
            max_call_levels: 32,
        }
    }
}

/// OAuth2 settings for the downstream authorization server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization code lifetime. Codes are single-use and short-lived.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Extra redirect URIs accepted for the static CLI client, beyond the
    /// loopback addresses it always may use.
    pub cli_redirect_uris: Vec<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(600),
            cli_redirect_uris: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.namespace, "supervisor");
        assert_eq!(config.transforms.evaluation_budget, Duration::from_secs(5));
        assert_eq!(
            config.oauth.authorization_code_lifetime,
            Duration::from_secs(600)
        );
    }

    #[test]
    fn test_partial_toml_style_json_overlay() {
        let config: SupervisorConfig = serde_json::from_str(
            r#"{"transforms": {"evaluation_budget": "2s 500ms"}}"#,
        )
        .unwrap();
        assert_eq!(
            config.transforms.evaluation_budget,
            Duration::from_millis(2500)
        );
        // Unspecified sections keep their defaults.
        assert_eq!(config.transforms.max_call_levels, 32);
        assert_eq!(config.namespace, "supervisor");
    }
}

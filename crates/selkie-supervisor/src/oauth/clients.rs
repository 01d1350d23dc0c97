//! Registered downstream OAuth2 clients.

use url::Url;

/// Client id of the supervisor's own command-line client. This is the only
/// client allowed to use the browserless header-credential flow.
pub const CLI_CLIENT_ID: &str = "pinniped-cli";

/// A registered downstream client.
#[derive(Debug, Clone)]
pub struct Client {
    /// The OAuth2 `client_id`.
    pub id: String,

    /// Exact-match redirect URIs registered for this client.
    pub redirect_uris: Vec<String>,

    /// Whether `http` loopback redirects with any port are accepted, for
    /// CLI clients that listen on an ephemeral localhost port.
    pub allow_loopback_redirects: bool,
}

impl Client {
    /// Returns `true` when `redirect_uri` is acceptable for this client.
    #[must_use]
    pub fn allows_redirect_uri(&self, redirect_uri: &Url) -> bool {
        if self
            .redirect_uris
            .iter()
            .any(|registered| registered == redirect_uri.as_str())
        {
            return true;
        }

        if self.allow_loopback_redirects {
            // RFC 8252 §7.3: the port of a loopback redirect is chosen at
            // runtime and must not be part of the registration match.
            let is_loopback = matches!(redirect_uri.host_str(), Some("127.0.0.1" | "[::1]" | "localhost"));
            return redirect_uri.scheme() == "http" && is_loopback;
        }

        false
    }
}

/// Static table of registered clients.
#[derive(Debug, Clone)]
pub struct ClientRegistry {
    clients: Vec<Client>,
}

impl ClientRegistry {
    /// A registry containing only the static CLI client, optionally with
    /// extra registered redirect URIs.
    #[must_use]
    pub fn with_cli_client(extra_redirect_uris: Vec<String>) -> Self {
        Self {
            clients: vec![Client {
                id: CLI_CLIENT_ID.to_string(),
                redirect_uris: extra_redirect_uris,
                allow_loopback_redirects: true,
            }],
        }
    }

    /// Add another registered client.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.clients.push(client);
        self
    }

    /// Look up a client by id.
    #[must_use]
    pub fn find(&self, client_id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == client_id)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_cli_client(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_client_accepts_loopback_any_port() {
        let registry = ClientRegistry::default();
        let cli = registry.find(CLI_CLIENT_ID).unwrap();

        for uri in [
            "http://127.0.0.1:51234/callback",
            "http://localhost:8000/callback",
            "http://127.0.0.1/callback",
        ] {
            assert!(cli.allows_redirect_uri(&Url::parse(uri).unwrap()), "{uri}");
        }

        for uri in [
            "https://attacker.example.com/callback",
            "http://192.168.1.1/callback",
        ] {
            assert!(!cli.allows_redirect_uri(&Url::parse(uri).unwrap()), "{uri}");
        }
    }

    #[test]
    fn test_registered_uris_match_exactly() {
        let registry = ClientRegistry::with_cli_client(vec![
            "https://console.example.com/callback".to_string(),
        ]);
        let cli = registry.find(CLI_CLIENT_ID).unwrap();

        assert!(cli.allows_redirect_uri(
            &Url::parse("https://console.example.com/callback").unwrap()
        ));
        assert!(!cli.allows_redirect_uri(
            &Url::parse("https://console.example.com/callback/extra").unwrap()
        ));
    }

    #[test]
    fn test_unknown_client_not_found() {
        assert!(ClientRegistry::default().find("web-app").is_none());
    }
}

//! Client configuration and its environment defaults.

use crate::options::RequestOptions;

pub const ENV_ADDR: &str = "VAULT_ADDR";
pub const ENV_TOKEN: &str = "VAULT_TOKEN";
pub const ENV_SKIP_VERIFY: &str = "VAULT_SKIP_VERIFY";
pub const ENV_NAMESPACE: &str = "VAULT_NAMESPACE";
pub const ENV_PREFIX: &str = "VAULT_PREFIX";

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8200";
pub const DEFAULT_API_VERSION: &str = "v1";

/// Read-only settings shared by every call made through a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_version: String,
    /// Inserted between the API version and every request path.
    pub path_prefix: String,
    pub token: Option<String>,
    pub namespace: Option<String>,
    /// Client-wide default options, the lowest-priority layer of every request.
    pub request_options: RequestOptions,
    /// Send `LIST` as `GET ...?list=true`.
    pub no_custom_http_verbs: bool,
    pub skip_tls_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            path_prefix: String::new(),
            token: None,
            namespace: None,
            request_options: RequestOptions::new(),
            no_custom_http_verbs: false,
            skip_tls_verify: false,
        }
    }
}

impl ClientConfig {
    /// Defaults seeded from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults seeded from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());
        Self {
            endpoint: non_empty(ENV_ADDR).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            path_prefix: non_empty(ENV_PREFIX).unwrap_or_default(),
            token: non_empty(ENV_TOKEN),
            namespace: non_empty(ENV_NAMESPACE),
            skip_tls_verify: non_empty(ENV_SKIP_VERIFY).is_some_and(|value| is_truthy(&value)),
            ..Self::default()
        }
    }

    /// Fully qualified URI for a rendered request path.
    pub fn uri_for(&self, path: &str) -> String {
        format!(
            "{}/{}{}{}",
            self.endpoint.trim_end_matches('/'),
            self.api_version,
            self.path_prefix,
            path
        )
    }

    /// The token, if one is configured and non-empty.
    pub fn active_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }

    pub fn active_namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no")
}

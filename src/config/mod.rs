use std::env;
use std::time::Duration;

/// Service configuration, sourced from the environment. Every option has a
/// documented default except the upstream API keys.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub database_path: String,
    pub log_level: String,
    pub oidc: OidcConfig,
    pub authorizer: UpstreamConfig,
    pub directory: UpstreamConfig,
    pub policy: PolicyConfig,
    pub keyset_ttl_secs: u64,
    pub upstream_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

/// Issuer settings used to validate bearer tokens.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer: String,
    pub audience: String,
    pub jwks_url: String,
}

/// Connection settings for one of the external services (authorizer or
/// directory).
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub address: String,
    pub api_key: String,
    pub ca_cert_path: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub instance_name: String,
    pub root: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3001".to_string(),
            database_path: "todo.db".to_string(),
            log_level: "info".to_string(),
            oidc: OidcConfig {
                issuer: "https://citadel.authn.localtest.me/dex".to_string(),
                audience: "citadel-app".to_string(),
                jwks_url: "https://citadel.authn.localtest.me/dex/keys".to_string(),
            },
            authorizer: UpstreamConfig {
                address: "https://localhost:8282".to_string(),
                api_key: String::new(),
                ca_cert_path: String::new(),
                tenant_id: String::new(),
            },
            directory: UpstreamConfig {
                address: "https://localhost:9292".to_string(),
                api_key: String::new(),
                ca_cert_path: String::new(),
                tenant_id: String::new(),
            },
            policy: PolicyConfig {
                instance_name: String::new(),
                root: "todoapp".to_string(),
            },
            keyset_ttl_secs: 300,
            upstream_timeout_secs: 5,
            shutdown_grace_secs: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Ok(v) = env::var("DATABASE_PATH") {
            self.database_path = v;
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            self.log_level = v;
        }

        if let Ok(v) = env::var("OIDC_ISSUER") {
            self.oidc.issuer = v;
        }
        if let Ok(v) = env::var("OIDC_AUDIENCE") {
            self.oidc.audience = v;
        }
        if let Ok(v) = env::var("JWKS_URL") {
            self.oidc.jwks_url = v;
        }

        if let Ok(v) = env::var("AUTHORIZER_SERVICE_URL") {
            self.authorizer.address = v;
        }
        if let Ok(v) = env::var("AUTHORIZER_API_KEY") {
            self.authorizer.api_key = v;
        }
        self.authorizer.ca_cert_path = env_first(&["AUTHORIZER_CA_CERT_PATH", "CA_CERT_PATH"])
            .unwrap_or(self.authorizer.ca_cert_path);

        if let Ok(v) = env::var("DIRECTORY_SERVICE_URL") {
            self.directory.address = v;
        }
        if let Ok(v) = env::var("DIRECTORY_API_KEY") {
            self.directory.api_key = v;
        }
        self.directory.ca_cert_path = env_first(&["DIRECTORY_CA_CERT_PATH", "CA_CERT_PATH"])
            .unwrap_or(self.directory.ca_cert_path);

        if let Ok(v) = env::var("TENANT_ID") {
            self.authorizer.tenant_id = v.clone();
            self.directory.tenant_id = v;
        }

        if let Ok(v) = env::var("POLICY_INSTANCE_NAME") {
            self.policy.instance_name = v;
        }
        if let Ok(v) = env::var("POLICY_ROOT") {
            self.policy.root = v;
        }

        if let Ok(v) = env::var("KEYSET_TTL_SECS") {
            self.keyset_ttl_secs = v.parse().unwrap_or(self.keyset_ttl_secs);
        }
        if let Ok(v) = env::var("UPSTREAM_TIMEOUT_SECS") {
            self.upstream_timeout_secs = v.parse().unwrap_or(self.upstream_timeout_secs);
        }
        if let Ok(v) = env::var("SHUTDOWN_GRACE_SECS") {
            self.shutdown_grace_secs = v.parse().unwrap_or(self.shutdown_grace_secs);
        }

        self
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn keyset_ttl(&self) -> Duration {
        Duration::from_secs(self.keyset_ttl_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read CA certificate {path}: {source}")]
    CaCert {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl UpstreamConfig {
    /// HTTP client for this upstream: bounded request timeout, optional
    /// extra CA root.
    pub fn http_client(&self, timeout: Duration) -> Result<reqwest::Client, ConfigError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        if !self.ca_cert_path.is_empty() {
            let pem = std::fs::read(&self.ca_cert_path).map_err(|source| ConfigError::CaCert {
                path: self.ca_cert_path.clone(),
                source,
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        Ok(builder.build()?)
    }
}

fn env_first(vars: &[&str]) -> Option<String> {
    vars.iter().find_map(|v| env::var(v).ok().filter(|s| !s.is_empty()))
}

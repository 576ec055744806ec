use crate::identification::DEFAULT_PARAMETER;
use http::header::HeaderName;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener and admin listener use the same address {0}")]
    ListenerConflict(String),

    #[error("Query parameter name cannot be empty")]
    EmptyParameter,

    #[error("Dashboard path prefix must start with '/': {0}")]
    InvalidPathPrefix(String),

    #[error("Invalid authorization header name: {0}")]
    InvalidHeader(String),

    #[error("Authorization role cannot be empty")]
    EmptyRole,

    #[error("Storage probe timeout cannot be 0")]
    InvalidProbeTimeout,
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for tenant requests
    pub listener: Listener,
    /// Admin listener for probes, tenant listing and reloads
    pub admin_listener: Listener,
    /// Where tenants are loaded from
    pub registry: registry::config::Config,
    /// How tenants are identified. Required; there is no default strategy.
    pub identification: IdentificationConfig,
    #[serde(default)]
    pub setup: SetupConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl Config {
    /// Validates the gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener == self.admin_listener {
            return Err(ValidationError::ListenerConflict(format!(
                "{}:{}",
                self.listener.host, self.listener.port
            )));
        }

        if let IdentificationConfig::QueryStringSourceIp { parameter, .. } = &self.identification
            && parameter.trim().is_empty()
        {
            return Err(ValidationError::EmptyParameter);
        }

        self.setup.validate()?;
        self.dashboard.validate()?;

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_parameter() -> String {
    DEFAULT_PARAMETER.into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum IdentificationConfig {
    Host {
        #[serde(default = "default_true")]
        case_fold: bool,
        #[serde(default = "default_true")]
        strip_port: bool,
    },
    QueryStringSourceIp {
        #[serde(default = "default_parameter")]
        parameter: String,
        /// Take the source address from X-Forwarded-For. Only enable behind a
        /// proxy that sets the header.
        #[serde(default)]
        trust_forwarded_for: bool,
    },
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SetupConfig {
    /// Check that the tenant's job storage accepts connections before
    /// handing the request downstream.
    #[serde(default)]
    pub probe_storage: bool,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for SetupConfig {
    fn default() -> Self {
        SetupConfig {
            probe_storage: false,
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl SetupConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.probe_storage && self.probe_timeout_ms == 0 {
            return Err(ValidationError::InvalidProbeTimeout);
        }
        Ok(())
    }
}

fn default_path_prefix() -> String {
    "/hangfire".into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DashboardConfig {
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    #[serde(default)]
    pub authorization: AuthorizationConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            path_prefix: default_path_prefix(),
            authorization: AuthorizationConfig::default(),
        }
    }
}

impl DashboardConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.path_prefix.starts_with('/') {
            return Err(ValidationError::InvalidPathPrefix(self.path_prefix.clone()));
        }
        self.authorization.validate()
    }
}

fn default_role() -> String {
    "admin".into()
}

fn default_roles_header() -> String {
    "x-dashboard-roles".into()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthorizationConfig {
    Role {
        #[serde(default = "default_role")]
        role: String,
        #[serde(default = "default_roles_header")]
        header: String,
        /// Peers allowed to set the roles header. Empty means the header is
        /// never honoured and every dashboard request is denied.
        #[serde(default)]
        trusted_proxies: Vec<IpAddr>,
    },
    None,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        AuthorizationConfig::Role {
            role: default_role(),
            header: default_roles_header(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl AuthorizationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            AuthorizationConfig::Role { role, header, .. } => {
                if role.trim().is_empty() {
                    return Err(ValidationError::EmptyRole);
                }
                HeaderName::from_bytes(header.as_bytes())
                    .map_err(|_| ValidationError::InvalidHeader(header.clone()))?;
                Ok(())
            }
            AuthorizationConfig::None => Ok(()),
        }
    }
}

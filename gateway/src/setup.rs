use crate::config::SetupConfig;
use async_trait::async_trait;
use registry::{Tenant, TenantId};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use url::Url;

/// Tenant config keys read during setup.
pub const STORAGE_CONNECTION: &str = "storage.connection";
pub const QUEUE_PREFIX: &str = "queue.prefix";
pub const QUEUES: &str = "queues";
pub const DASHBOARD_ROLE: &str = "dashboard.role";

const DEFAULT_QUEUE: &str = "default";

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("tenant {tenant} has no {key} configured")]
    MissingConfig { tenant: TenantId, key: &'static str },

    #[error("tenant {tenant} has an invalid storage connection: {source}")]
    InvalidConnection {
        tenant: TenantId,
        #[source]
        source: url::ParseError,
    },

    #[error("storage for tenant {tenant} is unavailable: {source}")]
    StorageUnavailable {
        tenant: TenantId,
        #[source]
        source: io::Error,
    },
}

/// Per-request view of a tenant's job environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantEnvironment {
    pub tenant_id: TenantId,
    pub storage: StorageConfig,
    /// Queue names, already namespaced for the tenant.
    pub queues: Vec<String>,
    pub authorization: AuthorizationRules,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub connection: Url,
}

impl StorageConfig {
    /// The connection with credentials removed, safe to log or render.
    pub fn redacted(&self) -> String {
        let mut url = self.connection.clone();
        // Both only fail for URLs that cannot carry credentials
        let _ = url.set_username("");
        let _ = url.set_password(None);
        url.to_string()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorizationRules {
    /// Role required to open the dashboard. The filter's default applies when unset.
    pub required_role: Option<String>,
}

/// Builds the environment downstream stages use for a bound tenant.
///
/// Implementations must be idempotent and must not touch process-wide state.
#[async_trait]
pub trait TenantSetup: Send + Sync {
    async fn apply(&self, tenant: &Tenant) -> Result<TenantEnvironment, SetupError>;
}

#[async_trait]
pub trait StorageProbe: Send + Sync {
    async fn check(&self, storage: &StorageConfig) -> io::Result<()>;
}

/// Checks that the storage host accepts TCP connections.
pub struct TcpStorageProbe {
    timeout: Duration,
}

impl TcpStorageProbe {
    pub fn new(timeout: Duration) -> Self {
        TcpStorageProbe { timeout }
    }
}

#[async_trait]
impl StorageProbe for TcpStorageProbe {
    async fn check(&self, storage: &StorageConfig) -> io::Result<()> {
        let url = &storage.connection;
        let host = url
            .host_str()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no port"))?;

        tokio::time::timeout(self.timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        Ok(())
    }
}

/// Default setup: job storage, queue namespace and dashboard role from the
/// tenant's config map.
#[derive(Default)]
pub struct JobStorageSetup {
    probe: Option<Arc<dyn StorageProbe>>,
}

impl JobStorageSetup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(probe: Arc<dyn StorageProbe>) -> Self {
        JobStorageSetup { probe: Some(probe) }
    }

    pub fn from_config(config: &SetupConfig) -> Self {
        match config.probe_storage {
            true => Self::with_probe(Arc::new(TcpStorageProbe::new(config.probe_timeout()))),
            false => Self::new(),
        }
    }

    fn environment(tenant: &Tenant) -> Result<TenantEnvironment, SetupError> {
        let connection = tenant
            .config_value(STORAGE_CONNECTION)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| SetupError::MissingConfig {
                tenant: tenant.id.clone(),
                key: STORAGE_CONNECTION,
            })?;
        let connection =
            Url::parse(connection.trim()).map_err(|source| SetupError::InvalidConnection {
                tenant: tenant.id.clone(),
                source,
            })?;

        let prefix = tenant
            .config_value(QUEUE_PREFIX)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&tenant.id);

        let mut queues: Vec<String> = Vec::new();
        for queue in tenant
            .config_value(QUEUES)
            .unwrap_or(DEFAULT_QUEUE)
            .split(',')
            .map(str::trim)
            .filter(|q| !q.is_empty())
        {
            let name = format!("{prefix}_{queue}");
            if !queues.contains(&name) {
                queues.push(name);
            }
        }
        if queues.is_empty() {
            queues.push(format!("{prefix}_{DEFAULT_QUEUE}"));
        }

        let required_role = tenant
            .config_value(DASHBOARD_ROLE)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_owned);

        Ok(TenantEnvironment {
            tenant_id: tenant.id.clone(),
            storage: StorageConfig { connection },
            queues,
            authorization: AuthorizationRules { required_role },
        })
    }
}

#[async_trait]
impl TenantSetup for JobStorageSetup {
    async fn apply(&self, tenant: &Tenant) -> Result<TenantEnvironment, SetupError> {
        let environment = Self::environment(tenant)?;

        if let Some(probe) = &self.probe {
            probe
                .check(&environment.storage)
                .await
                .map_err(|source| SetupError::StorageUnavailable {
                    tenant: tenant.id.clone(),
                    source,
                })?;
        }

        Ok(environment)
    }
}

use crate::metrics_defs::{REGISTRY_RELOAD, REGISTRY_TENANTS};
use crate::source::{InlineSource, SourceError, TenantSource};
use crate::types::{Tenant, TenantId, TenantKey, normalize_host};
use indexmap::IndexMap;
use parking_lot::RwLock;
use shared::{counter, gauge};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("tenant document contains no tenants")]
    NoTenants,

    #[error("tenant with an empty id")]
    EmptyId,

    #[error("duplicate tenant id: {0}")]
    DuplicateId(TenantId),

    #[error("tenant {tenant} has an empty host name")]
    EmptyHost { tenant: TenantId },

    #[error("host {host} is claimed by both {first} and {second}")]
    DuplicateHost {
        host: String,
        first: TenantId,
        second: TenantId,
    },

    #[error("address {address} is claimed by both {first} and {second}")]
    DuplicateAddress {
        address: IpAddr,
        first: TenantId,
        second: TenantId,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("could not load tenants: {0}")]
    Source(#[from] SourceError),

    #[error("invalid tenant registry: {0}")]
    Validation(#[from] ValidationError),

    #[error("tenant loading task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("another reload was in progress and the registry closed")]
    Closed(#[from] tokio::sync::AcquireError),

    #[error("the reloader has stopped")]
    ReloaderStopped,
}

/// One immutable, fully indexed generation of the tenant set.
///
/// Readers hold an `Arc<Snapshot>` for as long as they need it, so a lookup
/// never observes a mix of two generations.
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    tenants: IndexMap<TenantId, Arc<Tenant>>,
    by_host: HashMap<String, Arc<Tenant>>,
    by_address: HashMap<IpAddr, Arc<Tenant>>,
}

impl Snapshot {
    pub fn build(generation: u64, tenants: Vec<Tenant>) -> Result<Self, ValidationError> {
        if tenants.is_empty() {
            return Err(ValidationError::NoTenants);
        }

        let mut snapshot = Snapshot {
            generation,
            tenants: IndexMap::with_capacity(tenants.len()),
            by_host: HashMap::new(),
            by_address: HashMap::new(),
        };

        for tenant in tenants {
            if tenant.id.trim().is_empty() {
                return Err(ValidationError::EmptyId);
            }
            if snapshot.tenants.contains_key(&tenant.id) {
                return Err(ValidationError::DuplicateId(tenant.id));
            }

            let tenant = Arc::new(tenant);

            for host in &tenant.hosts {
                let host = normalize_host(host);
                if host.is_empty() {
                    return Err(ValidationError::EmptyHost {
                        tenant: tenant.id.clone(),
                    });
                }
                match snapshot.by_host.entry(host) {
                    Entry::Occupied(entry) => {
                        // A tenant listing the same host twice is harmless
                        if entry.get().id != tenant.id {
                            return Err(ValidationError::DuplicateHost {
                                host: entry.key().clone(),
                                first: entry.get().id.clone(),
                                second: tenant.id.clone(),
                            });
                        }
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(tenant.clone());
                    }
                }
            }

            for address in &tenant.addresses {
                // IPv4-mapped IPv6 and plain IPv4 are the same peer
                let address = address.to_canonical();
                match snapshot.by_address.entry(address) {
                    Entry::Occupied(entry) => {
                        if entry.get().id != tenant.id {
                            return Err(ValidationError::DuplicateAddress {
                                address,
                                first: entry.get().id.clone(),
                                second: tenant.id.clone(),
                            });
                        }
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(tenant.clone());
                    }
                }
            }

            snapshot.tenants.insert(tenant.id.clone(), tenant);
        }

        Ok(snapshot)
    }

    pub fn find(&self, key: &TenantKey) -> Option<Arc<Tenant>> {
        match key {
            TenantKey::Id(id) => self.tenants.get(id),
            TenantKey::Host(host) => self.by_host.get(&normalize_host(host)),
            TenantKey::ExactHost(host) => self
                .by_host
                .get(&normalize_host(host))
                .filter(|tenant| tenant.has_exact_host(host)),
            TenantKey::Address(address) => self.by_address.get(&address.to_canonical()),
        }
        .cloned()
    }

    /// Tenants in the order the backing source listed them.
    pub fn all(&self) -> Vec<Arc<Tenant>> {
        self.tenants.values().cloned().collect()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

struct RegistryInner {
    source: Arc<dyn TenantSource>,
    snapshot: RwLock<Arc<Snapshot>>,
    // Only one reload runs at a time so generations stay monotonic.
    update_lock: Semaphore,
}

/// The set of known tenants, shared by every request.
///
/// Cloning is cheap. Lookups take the read lock only long enough to clone the
/// current snapshot pointer; reloads build a new snapshot off to the side and
/// swap it in.
#[derive(Clone)]
pub struct TenantRegistry {
    inner: Arc<RegistryInner>,
}

impl TenantRegistry {
    /// Performs the initial load. Any source or validation error is returned
    /// so the process can refuse to start.
    pub fn load(source: Arc<dyn TenantSource>) -> Result<Self, LoadError> {
        let tenants = source.load()?;
        let snapshot = Snapshot::build(1, tenants)?;

        tracing::info!(
            source = %source.describe(),
            tenants = snapshot.len(),
            "loaded tenant registry"
        );
        gauge!(REGISTRY_TENANTS).set(snapshot.len() as f64);

        Ok(TenantRegistry {
            inner: Arc::new(RegistryInner {
                source,
                snapshot: RwLock::new(Arc::new(snapshot)),
                update_lock: Semaphore::new(1),
            }),
        })
    }

    pub fn from_tenants(tenants: Vec<Tenant>) -> Result<Self, LoadError> {
        Self::load(Arc::new(InlineSource::new(tenants)))
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.read().clone()
    }

    pub fn all(&self) -> Vec<Arc<Tenant>> {
        self.snapshot().all()
    }

    pub fn find(&self, key: &TenantKey) -> Option<Arc<Tenant>> {
        self.snapshot().find(key)
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation()
    }

    /// Reloads from the backing source and returns the new generation.
    ///
    /// On failure the current snapshot stays in place.
    pub async fn reload(&self) -> Result<u64, LoadError> {
        let _permit = self.inner.update_lock.acquire().await?;

        let source = self.inner.source.clone();
        let result = tokio::task::spawn_blocking(move || source.load())
            .await
            .map_err(LoadError::from)
            .and_then(|loaded| loaded.map_err(LoadError::from))
            .and_then(|tenants| {
                Snapshot::build(self.generation() + 1, tenants).map_err(LoadError::from)
            });

        match result {
            Ok(snapshot) => {
                let generation = snapshot.generation();
                let tenants = snapshot.len();
                *self.inner.snapshot.write() = Arc::new(snapshot);

                counter!(REGISTRY_RELOAD, "result" => "ok").increment(1);
                gauge!(REGISTRY_TENANTS).set(tenants as f64);
                tracing::info!(generation, tenants, "reloaded tenant registry");
                Ok(generation)
            }
            Err(err) => {
                counter!(REGISTRY_RELOAD, "result" => "error").increment(1);
                tracing::error!(
                    source = %self.inner.source.describe(),
                    error = %err,
                    "tenant registry reload failed, keeping previous snapshot"
                );
                Err(err)
            }
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

pub type TenantId = String;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Host names this tenant answers to.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Source addresses this tenant is identified by.
    #[serde(default)]
    pub addresses: Vec<IpAddr>,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl Tenant {
    pub fn new<I, N>(id: I, name: N) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Tenant {
            id: id.into(),
            name: name.into(),
            hosts: Vec::new(),
            addresses: Vec::new(),
            config: BTreeMap::new(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push(host.into());
        self
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.addresses.push(address);
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}

/// A raw identifier produced by an identification strategy.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TenantKey {
    Id(TenantId),
    /// Host matched case-insensitively.
    Host(String),
    /// Host that must equal one of the tenant's configured hosts, case included.
    ExactHost(String),
    Address(IpAddr),
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantKey::Id(id) => write!(f, "id={id}"),
            TenantKey::Host(host) | TenantKey::ExactHost(host) => write!(f, "host={host}"),
            TenantKey::Address(addr) => write!(f, "address={addr}"),
        }
    }
}

/// The form host names are indexed under: lower case, no trailing dot.
pub fn normalize_host(host: &str) -> String {
    trim_host(host).to_ascii_lowercase()
}

fn trim_host(host: &str) -> &str {
    host.trim().trim_end_matches('.')
}

impl Tenant {
    /// Whether `host` equals one of the configured hosts without case folding.
    pub fn has_exact_host(&self, host: &str) -> bool {
        let host = trim_host(host);
        self.hosts.iter().any(|h| trim_host(h) == host)
    }
}

use crate::config::AuthorizationConfig;
use crate::setup::TenantEnvironment;
use http::header::{HeaderMap, HeaderName};
use registry::Tenant;
use std::net::IpAddr;
use std::sync::Arc;

/// Decides whether a request may open the dashboard of the tenant it is bound to.
///
/// `peer` is the address of the connection the request arrived on, if known.
pub trait AuthorizationFilter: Send + Sync {
    fn authorize(
        &self,
        tenant: &Tenant,
        environment: &TenantEnvironment,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
    ) -> bool;
}

pub struct AllowAll;

impl AuthorizationFilter for AllowAll {
    fn authorize(
        &self,
        _: &Tenant,
        _: &TenantEnvironment,
        _: &HeaderMap,
        _: Option<IpAddr>,
    ) -> bool {
        true
    }
}

/// Requires a role taken from a request header.
///
/// The header holds comma separated grants. `admin` grants the role for every
/// tenant, `acme:admin` only for tenant `acme`.
///
/// Grants are only read from requests whose peer is one of `trusted_proxies`.
/// That proxy is expected to authenticate the user, drop any client supplied
/// value and set the header itself. Requests from any other peer are denied.
pub struct RoleAuthorizationFilter {
    header: HeaderName,
    default_role: String,
    trusted_proxies: Vec<IpAddr>,
}

impl RoleAuthorizationFilter {
    pub fn new(
        header: HeaderName,
        default_role: impl Into<String>,
        trusted_proxies: impl IntoIterator<Item = IpAddr>,
    ) -> Self {
        RoleAuthorizationFilter {
            header,
            default_role: default_role.into(),
            trusted_proxies: trusted_proxies
                .into_iter()
                .map(|ip| ip.to_canonical())
                .collect(),
        }
    }

    fn is_trusted(&self, peer: Option<IpAddr>) -> bool {
        peer.is_some_and(|peer| self.trusted_proxies.contains(&peer.to_canonical()))
    }
}

impl AuthorizationFilter for RoleAuthorizationFilter {
    fn authorize(
        &self,
        tenant: &Tenant,
        environment: &TenantEnvironment,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
    ) -> bool {
        if !self.is_trusted(peer) {
            tracing::debug!(
                tenant = tenant.id.as_str(),
                peer = ?peer,
                "ignoring role header from untrusted peer"
            );
            return false;
        }

        let required = environment
            .authorization
            .required_role
            .as_deref()
            .unwrap_or(&self.default_role);

        headers
            .get_all(&self.header)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .any(|grant| match grant.split_once(':') {
                Some((tenant_id, role)) => tenant_id == tenant.id && role == required,
                None => grant == required,
            })
    }
}

pub fn from_config(config: &AuthorizationConfig) -> Arc<dyn AuthorizationFilter> {
    match config {
        AuthorizationConfig::Role {
            role,
            header,
            trusted_proxies,
        } => {
            // Invalid names are rejected by config validation
            let header = HeaderName::from_bytes(header.as_bytes())
                .unwrap_or_else(|_| HeaderName::from_static("x-dashboard-roles"));
            Arc::new(RoleAuthorizationFilter::new(
                header,
                role.clone(),
                trusted_proxies.iter().copied(),
            ))
        }
        AuthorizationConfig::None => Arc::new(AllowAll),
    }
}

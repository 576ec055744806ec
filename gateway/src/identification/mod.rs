mod dynamic;
mod host;
mod query;

pub use dynamic::{DynamicStrategy, IdentifyFuture};
pub use host::HostStrategy;
pub use query::{DEFAULT_PARAMETER, QueryStringSourceIpStrategy};

use crate::config::IdentificationConfig;
use crate::context::{Environment, ResolutionContext};
use registry::{Tenant, TenantKey, TenantRegistry};
use std::sync::Arc;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a strategy produced for a request.
#[derive(Clone, Debug, PartialEq)]
pub enum Identification {
    /// A raw identifier to be looked up in the registry.
    Key(TenantKey),
    /// A tenant the strategy resolved on its own. Used as-is.
    Tenant(Arc<Tenant>),
}

/// The single strategy active in a deployment.
#[derive(Clone, Debug)]
pub enum IdentificationStrategy {
    Host(HostStrategy),
    QueryStringSourceIp(QueryStringSourceIpStrategy),
    Dynamic(DynamicStrategy),
}

impl IdentificationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            IdentificationStrategy::Host(_) => "host",
            IdentificationStrategy::QueryStringSourceIp(_) => "query_string_source_ip",
            IdentificationStrategy::Dynamic(_) => "dynamic",
        }
    }

    pub async fn identify(
        &self,
        env: &Environment,
        ctx: &ResolutionContext,
    ) -> Result<Option<Identification>, BoxError> {
        match self {
            IdentificationStrategy::Host(strategy) => {
                Ok(strategy.identify(ctx).map(Identification::Key))
            }
            IdentificationStrategy::QueryStringSourceIp(strategy) => {
                Ok(strategy.identify(ctx).map(Identification::Key))
            }
            IdentificationStrategy::Dynamic(strategy) => strategy.identify(env, ctx).await,
        }
    }

    /// Every tenant this strategy can resolve to.
    pub fn all_tenants(&self, env: &Environment, registry: &TenantRegistry) -> Vec<Arc<Tenant>> {
        match self {
            IdentificationStrategy::Dynamic(strategy) => strategy.all_tenants(env),
            _ => registry.all(),
        }
    }
}

impl From<&IdentificationConfig> for IdentificationStrategy {
    fn from(config: &IdentificationConfig) -> Self {
        match config {
            IdentificationConfig::Host {
                case_fold,
                strip_port,
            } => IdentificationStrategy::Host(HostStrategy::new(*case_fold, *strip_port)),
            IdentificationConfig::QueryStringSourceIp {
                parameter,
                trust_forwarded_for,
            } => IdentificationStrategy::QueryStringSourceIp(QueryStringSourceIpStrategy::new(
                parameter.clone(),
                *trust_forwarded_for,
            )),
        }
    }
}

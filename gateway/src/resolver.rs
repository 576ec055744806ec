use crate::context::{Environment, ResolutionContext};
use crate::identification::{Identification, IdentificationStrategy};
use crate::metrics_defs::{TENANT_RESOLUTION, TENANT_RESOLUTION_DURATION};
use registry::{Tenant, TenantRegistry};
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Bound,
    NoIdentifier,
    NotFound,
    Failed,
}

impl Outcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Outcome::Bound => "bound",
            Outcome::NoIdentifier => "no_identifier",
            Outcome::NotFound => "not_found",
            Outcome::Failed => "failed",
        }
    }
}

/// Result of resolving one request.
///
/// Every outcome other than `Bound` carries no tenant; callers treat them
/// alike. The outcome and identifier are kept for logs and metrics.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub identifier: Option<String>,
    pub tenant: Option<Arc<Tenant>>,
}

impl Resolution {
    fn bound(identifier: String, tenant: Arc<Tenant>) -> Self {
        Resolution {
            outcome: Outcome::Bound,
            identifier: Some(identifier),
            tenant: Some(tenant),
        }
    }

    fn absent(outcome: Outcome, identifier: Option<String>) -> Self {
        Resolution {
            outcome,
            identifier,
            tenant: None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.tenant.is_some()
    }
}

pub struct TenantResolver {
    strategy: IdentificationStrategy,
    registry: TenantRegistry,
    environment: Environment,
}

impl TenantResolver {
    pub fn new(
        strategy: IdentificationStrategy,
        registry: TenantRegistry,
        environment: Environment,
    ) -> Self {
        TenantResolver {
            strategy,
            registry,
            environment,
        }
    }

    pub fn strategy(&self) -> &IdentificationStrategy {
        &self.strategy
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Identifies and looks up the tenant for one request. Never fails:
    /// strategy errors are logged and reported as `Outcome::Failed`.
    pub async fn resolve(&self, ctx: &ResolutionContext) -> Resolution {
        let start = Instant::now();

        let resolution = match self.strategy.identify(&self.environment, ctx).await {
            Ok(Some(Identification::Key(key))) => {
                let identifier = key.to_string();
                match self.registry.find(&key) {
                    Some(tenant) => Resolution::bound(identifier, tenant),
                    None => Resolution::absent(Outcome::NotFound, Some(identifier)),
                }
            }
            // The dynamic strategy already resolved the tenant
            Ok(Some(Identification::Tenant(tenant))) => {
                Resolution::bound(format!("id={}", tenant.id), tenant)
            }
            Ok(None) => Resolution::absent(Outcome::NoIdentifier, None),
            Err(err) => {
                tracing::warn!(
                    strategy = self.strategy.name(),
                    path = ctx.path(),
                    error = %err,
                    "tenant identification failed"
                );
                Resolution::absent(Outcome::Failed, None)
            }
        };

        counter!(TENANT_RESOLUTION, "outcome" => resolution.outcome.as_str()).increment(1);
        histogram!(TENANT_RESOLUTION_DURATION).record(start.elapsed().as_secs_f64());
        tracing::debug!(
            strategy = self.strategy.name(),
            outcome = resolution.outcome.as_str(),
            identifier = resolution.identifier.as_deref(),
            tenant = resolution.tenant.as_ref().map(|t| t.id.as_str()),
            "resolved tenant"
        );

        resolution
    }

    /// Every tenant the active strategy can resolve to.
    pub fn all_tenants(&self) -> Vec<Arc<Tenant>> {
        self.strategy.all_tenants(&self.environment, &self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identification::{
        BoxError, DynamicStrategy, HostStrategy, QueryStringSourceIpStrategy,
    };
    use crate::testutils::fixture_registry;
    use registry::TenantKey;
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn host_resolver() -> TenantResolver {
        TenantResolver::new(
            IdentificationStrategy::Host(HostStrategy::default()),
            fixture_registry(),
            Environment::default(),
        )
    }

    #[tokio::test]
    async fn test_every_registered_tenant_resolves() {
        let resolver = host_resolver();
        for tenant in fixture_registry().all() {
            for host in &tenant.hosts {
                let ctx = ResolutionContext::new().with_host(host.clone());
                let resolution = resolver.resolve(&ctx).await;
                assert_eq!(resolution.outcome, Outcome::Bound);
                assert_eq!(resolution.tenant.unwrap().id, tenant.id);
                assert_eq!(resolution.identifier, Some(format!("host={host}")));
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_and_missing_identifiers() {
        let resolver = host_resolver();

        let resolution = resolver
            .resolve(&ResolutionContext::new().with_host("unknown.example.com"))
            .await;
        assert_eq!(resolution.outcome, Outcome::NotFound);
        assert!(!resolution.is_bound());
        assert_eq!(
            resolution.identifier.as_deref(),
            Some("host=unknown.example.com")
        );

        let resolution = resolver.resolve(&ResolutionContext::new()).await;
        assert_eq!(resolution.outcome, Outcome::NoIdentifier);
        assert!(!resolution.is_bound());
    }

    #[tokio::test]
    async fn test_host_without_case_folding() {
        let registry = TenantRegistry::from_tenants(vec![
            Tenant::new("acme", "Acme Corp").with_host("Acme.example.com"),
        ])
        .unwrap();
        let resolver = TenantResolver::new(
            IdentificationStrategy::Host(HostStrategy::new(false, true)),
            registry,
            Environment::default(),
        );

        let ctx = ResolutionContext::new().with_host("Acme.example.com:8080");
        let resolution = resolver.resolve(&ctx).await;
        assert_eq!(resolution.outcome, Outcome::Bound);
        assert_eq!(resolution.tenant.unwrap().id, "acme");

        let ctx = ResolutionContext::new().with_host("acme.example.com");
        assert_eq!(resolver.resolve(&ctx).await.outcome, Outcome::NotFound);
    }

    #[tokio::test]
    async fn test_query_string_source_ip() {
        let resolver = TenantResolver::new(
            IdentificationStrategy::QueryStringSourceIp(QueryStringSourceIpStrategy::default()),
            fixture_registry(),
            Environment::default(),
        );

        // acme by parameter, globex by address: parameter wins
        let ctx = ResolutionContext::new()
            .with_query_param("tenant", "acme")
            .with_source_addr(ip("10.0.0.2"));
        assert_eq!(resolver.resolve(&ctx).await.tenant.unwrap().id, "acme");

        // No parameter: address
        let ctx = ResolutionContext::new().with_source_addr(ip("10.0.0.2"));
        assert_eq!(resolver.resolve(&ctx).await.tenant.unwrap().id, "globex");

        // Unknown parameter does not fall back to the address
        let ctx = ResolutionContext::new()
            .with_query_param("tenant", "initech")
            .with_source_addr(ip("10.0.0.2"));
        assert_eq!(resolver.resolve(&ctx).await.outcome, Outcome::NotFound);
    }

    #[tokio::test]
    async fn test_dynamic_return_shapes() {
        let registry = fixture_registry();

        // Key shape goes through the registry
        let resolver = TenantResolver::new(
            IdentificationStrategy::Dynamic(DynamicStrategy::new(
                |_, _| async {
                    let key = TenantKey::Id("globex".into());
                    Ok::<_, BoxError>(Some(Identification::Key(key)))
                },
                |_| Vec::new(),
            )),
            registry.clone(),
            Environment::default(),
        );
        let resolution = resolver.resolve(&ResolutionContext::new()).await;
        assert_eq!(resolution.tenant.unwrap().id, "globex");

        // Tenant shape bypasses the registry
        let outside = Arc::new(Tenant::new("initech", "Initech"));
        let returned = outside.clone();
        let listed = outside.clone();
        let resolver = TenantResolver::new(
            IdentificationStrategy::Dynamic(DynamicStrategy::new(
                move |_, _| {
                    let tenant = returned.clone();
                    async move { Ok::<_, BoxError>(Some(Identification::Tenant(tenant))) }
                },
                move |_| vec![listed.clone()],
            )),
            registry,
            Environment::default(),
        );
        let resolution = resolver.resolve(&ResolutionContext::new()).await;
        assert_eq!(resolution.outcome, Outcome::Bound);
        assert_eq!(resolution.tenant, Some(outside));
        assert_eq!(resolution.identifier.as_deref(), Some("id=initech"));

        // Listing comes from the enumerator, not the registry
        let all = resolver.all_tenants();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "initech");
    }

    #[tokio::test]
    async fn test_strategy_errors_become_absent() {
        let resolver = TenantResolver::new(
            IdentificationStrategy::Dynamic(DynamicStrategy::new(
                |_, _| async {
                    Err::<Option<Identification>, BoxError>("lookup service down".into())
                },
                |_| Vec::new(),
            )),
            fixture_registry(),
            Environment::default(),
        );
        let resolution = resolver.resolve(&ResolutionContext::new()).await;
        assert_eq!(resolution.outcome, Outcome::Failed);
        assert_eq!(resolution.tenant, None);
    }

    #[tokio::test]
    async fn test_dynamic_miss_is_not_found() {
        let resolver = TenantResolver::new(
            IdentificationStrategy::Dynamic(DynamicStrategy::new(
                |_, _| async {
                    let key = TenantKey::Id("nobody".into());
                    Ok::<_, BoxError>(Some(Identification::Key(key)))
                },
                |_| Vec::new(),
            )),
            fixture_registry(),
            Environment::default(),
        );
        assert_eq!(
            resolver.resolve(&ResolutionContext::new()).await.outcome,
            Outcome::NotFound
        );
    }

    #[test]
    fn test_all_tenants_from_registry() {
        let resolver = host_resolver();
        let ids: Vec<_> = resolver.all_tenants().iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["acme", "globex"]);
    }
}

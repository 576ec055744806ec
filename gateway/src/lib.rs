pub mod admin;
pub mod authorization;
pub mod binder;
pub mod config;
pub mod context;
pub mod dashboard;
pub mod errors;
pub mod identification;
pub mod metrics_defs;
pub mod resolver;
pub mod setup;

#[cfg(test)]
mod testutils;

pub use binder::{TenantBinder, TenantBinding, bound_tenant, tenant_environment};
pub use context::{Environment, ResolutionContext};
pub use errors::GatewayError;
pub use identification::{Identification, IdentificationStrategy};
pub use resolver::{Outcome, Resolution, TenantResolver};
pub use setup::{TenantEnvironment, TenantSetup};

use admin::GatewayAdminService;
use dashboard::DashboardService;
use registry::{Reloader, TenantRegistry};
use setup::JobStorageSetup;
use shared::http::run_http_service;
use std::sync::Arc;

/// A fully assembled gateway: tenant listener plus admin listener.
pub struct Gateway {
    config: config::Config,
    environment: Environment,
    registry: TenantRegistry,
    strategy: IdentificationStrategy,
}

impl Gateway {
    /// Assembles a gateway from an already loaded registry. This is the only
    /// way to run with a dynamic strategy.
    pub fn new(
        config: config::Config,
        environment: Environment,
        registry: TenantRegistry,
        strategy: IdentificationStrategy,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        Ok(Gateway {
            config,
            environment,
            registry,
            strategy,
        })
    }

    /// Validates the config and loads the registry. Any failure here is fatal.
    pub fn from_config(
        config: config::Config,
        environment: Environment,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let source = registry::get_source(config.registry.source.clone());
        let registry = TenantRegistry::load(source)?;
        let strategy = IdentificationStrategy::from(&config.identification);
        Self::new(config, environment, registry, strategy)
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    /// Builds the tenant-facing service and the admin service. Spawns the
    /// registry reloader, so this must run inside a tokio runtime.
    pub fn services(self) -> (TenantBinder<DashboardService>, GatewayAdminService) {
        let reloader = Arc::new(Reloader::spawn(
            self.registry.clone(),
            self.config.registry.refresh_interval(),
        ));
        let resolver = Arc::new(TenantResolver::new(
            self.strategy,
            self.registry,
            self.environment,
        ));
        let setup: Arc<dyn TenantSetup> =
            Arc::new(JobStorageSetup::from_config(&self.config.setup));

        let binder = TenantBinder::new(
            resolver.clone(),
            setup,
            DashboardService::new(&self.config.dashboard),
        );
        let admin = GatewayAdminService::new(resolver, reloader);
        (binder, admin)
    }

    pub async fn run(self) -> Result<(), GatewayError> {
        let listener = self.config.listener.clone();
        let admin_listener = self.config.admin_listener.clone();
        tracing::info!(
            strategy = self.strategy.name(),
            tenants = self.registry.snapshot().len(),
            "starting gateway"
        );

        let (binder, admin) = self.services();
        let tenant_task = run_http_service(&listener.host, listener.port, binder);
        let admin_task = run_http_service(&admin_listener.host, admin_listener.port, admin);

        tokio::try_join!(tenant_task, admin_task)?;
        Ok(())
    }
}

pub async fn run(config: config::Config, environment: Environment) -> Result<(), GatewayError> {
    Gateway::from_config(config, environment)?.run().await
}

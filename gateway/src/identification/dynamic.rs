use crate::context::{Environment, ResolutionContext};
use crate::identification::{BoxError, Identification};
use registry::Tenant;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type IdentifyFuture =
    Pin<Box<dyn Future<Output = Result<Option<Identification>, BoxError>> + Send + 'static>>;

type IdentifyFn = dyn Fn(&Environment, &ResolutionContext) -> IdentifyFuture + Send + Sync;
type AllTenantsFn = dyn Fn(&Environment) -> Vec<Arc<Tenant>> + Send + Sync;

/// Identification delegated to caller-supplied functions.
///
/// The identify callback may return a key to look up in the registry or a
/// tenant it already resolved itself. The enumerator replaces the registry
/// for "list all tenants".
#[derive(Clone)]
pub struct DynamicStrategy {
    identify: Arc<IdentifyFn>,
    all_tenants: Arc<AllTenantsFn>,
}

impl DynamicStrategy {
    pub fn new<F, Fut, L>(identify: F, all_tenants: L) -> Self
    where
        F: Fn(&Environment, &ResolutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Identification>, BoxError>> + Send + 'static,
        L: Fn(&Environment) -> Vec<Arc<Tenant>> + Send + Sync + 'static,
    {
        let identify: Arc<IdentifyFn> = Arc::new(
            move |env: &Environment, ctx: &ResolutionContext| -> IdentifyFuture {
                Box::pin(identify(env, ctx))
            },
        );

        DynamicStrategy {
            identify,
            all_tenants: Arc::new(all_tenants),
        }
    }

    pub async fn identify(
        &self,
        env: &Environment,
        ctx: &ResolutionContext,
    ) -> Result<Option<Identification>, BoxError> {
        (self.identify)(env, ctx).await
    }

    pub fn all_tenants(&self, env: &Environment) -> Vec<Arc<Tenant>> {
        (self.all_tenants)(env)
    }
}

impl fmt::Debug for DynamicStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicStrategy").finish_non_exhaustive()
    }
}

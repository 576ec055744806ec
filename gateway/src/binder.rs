use crate::context::ResolutionContext;
use crate::metrics_defs::TENANT_SETUP_FAILED;
use crate::resolver::TenantResolver;
use crate::setup::{TenantEnvironment, TenantSetup};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use registry::Tenant;
use shared::counter;
use shared::http::{ServiceBody, make_boxed_error_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Instrument;

/// The tenant a request is bound to. Lives in the request extensions.
///
/// Only the binder creates one, and only once per request.
#[derive(Clone, Debug, PartialEq)]
pub struct TenantBinding {
    tenant: Arc<Tenant>,
    identifier: String,
}

impl TenantBinding {
    pub(crate) fn new(tenant: Arc<Tenant>, identifier: String) -> Self {
        TenantBinding { tenant, identifier }
    }

    pub fn tenant(&self) -> &Arc<Tenant> {
        &self.tenant
    }

    /// The raw identifier the tenant was resolved from, e.g. `host=acme.example.com`.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

pub fn bound_tenant<B>(req: &Request<B>) -> Option<&TenantBinding> {
    req.extensions().get::<TenantBinding>()
}

pub fn tenant_environment<B>(req: &Request<B>) -> Option<&TenantEnvironment> {
    req.extensions().get::<TenantEnvironment>()
}

/// Middleware that resolves the tenant of every request before the inner
/// service sees it.
///
/// Requests without a tenant are answered with 404 and never reach `inner`.
/// Setup failures are answered with 500.
pub struct TenantBinder<S> {
    resolver: Arc<TenantResolver>,
    setup: Arc<dyn TenantSetup>,
    inner: Arc<S>,
}

impl<S> TenantBinder<S> {
    pub fn new(resolver: Arc<TenantResolver>, setup: Arc<dyn TenantSetup>, inner: S) -> Self {
        TenantBinder {
            resolver,
            setup,
            inner: Arc::new(inner),
        }
    }
}

impl<S, B> Service<Request<B>> for TenantBinder<S>
where
    S: Service<Request<B>, Response = Response<ServiceBody>> + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    B: Send + 'static,
{
    type Response = Response<ServiceBody>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, mut req: Request<B>) -> Self::Future {
        let resolver = self.resolver.clone();
        let setup = self.setup.clone();
        let inner = self.inner.clone();

        Box::pin(async move {
            if let Some(existing) = bound_tenant(&req) {
                tracing::error!(
                    tenant = existing.tenant().id.as_str(),
                    "request is already bound to a tenant"
                );
                return Ok(make_boxed_error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                ));
            }

            let ctx = ResolutionContext::from_request(&req);
            // Nothing is attached to the request until resolution completes
            let resolution = resolver.resolve(&ctx).await;

            let (Some(tenant), Some(identifier)) = (resolution.tenant, resolution.identifier)
            else {
                tracing::info!(
                    outcome = resolution.outcome.as_str(),
                    host = ctx.host(),
                    path = ctx.path(),
                    "rejecting request without tenant"
                );
                return Ok(make_boxed_error_response(StatusCode::NOT_FOUND));
            };

            let span = tracing::info_span!(
                "tenant",
                tenant = tenant.id.as_str(),
                identifier = identifier.as_str()
            );

            async move {
                req.extensions_mut()
                    .insert(TenantBinding::new(tenant.clone(), identifier));

                let environment = match setup.apply(&tenant).await {
                    Ok(environment) => environment,
                    Err(err) => {
                        tracing::error!(error = %err, "tenant setup failed");
                        counter!(TENANT_SETUP_FAILED).increment(1);
                        return Ok(make_boxed_error_response(
                            StatusCode::INTERNAL_SERVER_ERROR,
                        ));
                    }
                };
                req.extensions_mut().insert(environment);

                inner.call(req).await
            }
            .instrument(span)
            .await
        })
    }
}

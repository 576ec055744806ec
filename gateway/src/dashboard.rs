use crate::authorization::{self, AuthorizationFilter};
use crate::binder::{bound_tenant, tenant_environment};
use crate::config::DashboardConfig;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use shared::http::{ConnectInfo, ServiceBody, full_body, make_boxed_error_response};
use std::convert::Infallible;
use std::future::{Ready, ready};
use std::sync::Arc;

/// Job dashboard for the tenant a request is bound to.
///
/// Meant to run behind the `TenantBinder`; a request without a binding is
/// answered with 500.
pub struct DashboardService {
    path_prefix: String,
    filter: Arc<dyn AuthorizationFilter>,
}

impl DashboardService {
    pub fn new(config: &DashboardConfig) -> Self {
        Self::with_filter(
            &config.path_prefix,
            authorization::from_config(&config.authorization),
        )
    }

    pub fn with_filter(path_prefix: &str, filter: Arc<dyn AuthorizationFilter>) -> Self {
        DashboardService {
            path_prefix: path_prefix.trim_end_matches('/').to_owned(),
            filter,
        }
    }

    fn handle<B>(&self, req: &Request<B>) -> Response<ServiceBody> {
        let page = match req.uri().path().strip_prefix(self.path_prefix.as_str()) {
            Some("" | "/") => Page::Overview,
            Some("/queues" | "/queues/") => Page::Queues,
            _ => return make_boxed_error_response(StatusCode::NOT_FOUND),
        };

        if req.method() != Method::GET {
            return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
        }

        let (Some(binding), Some(environment)) = (bound_tenant(req), tenant_environment(req))
        else {
            tracing::error!(
                path = req.uri().path(),
                "dashboard reached without a bound tenant"
            );
            return make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR);
        };
        let tenant = binding.tenant();

        let peer = req.extensions().get::<ConnectInfo>().map(|info| info.0.ip());
        if !self.filter.authorize(tenant, environment, req.headers(), peer) {
            tracing::info!(tenant = tenant.id.as_str(), "dashboard access denied");
            return make_boxed_error_response(StatusCode::UNAUTHORIZED);
        }

        let body = match page {
            Page::Overview => json!({
                "tenant": {"id": tenant.id, "name": tenant.name},
                "storage": environment.storage.redacted(),
                "queues": environment.queues,
            }),
            Page::Queues => json!({ "queues": environment.queues }),
        };

        let mut response = Response::new(full_body(body.to_string()));
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        response
    }
}

enum Page {
    Overview,
    Queues,
}

impl<B> Service<Request<B>> for DashboardService {
    type Response = Response<ServiceBody>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        ready(Ok(self.handle(&req)))
    }
}

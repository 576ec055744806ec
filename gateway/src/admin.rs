use crate::resolver::TenantResolver;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use registry::Reloader;
use serde::Serialize;
use shared::admin_service::AdminService;
use shared::http::{ServiceBody, full_body, make_boxed_error_response};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Serialize)]
struct TenantSummary<'a> {
    id: &'a str,
    name: &'a str,
}

/// Admin routes: tenant listing and on-demand reload on top of the probes.
pub struct GatewayAdminService {
    resolver: Arc<TenantResolver>,
    reloader: Arc<Reloader>,
    probes: AdminService<fn() -> bool, Infallible>,
}

impl GatewayAdminService {
    pub fn new(resolver: Arc<TenantResolver>, reloader: Arc<Reloader>) -> Self {
        GatewayAdminService {
            resolver,
            reloader,
            probes: AdminService::new(always_ready as fn() -> bool),
        }
    }
}

// The registry always holds a valid snapshot once the gateway is up
fn always_ready() -> bool {
    true
}

fn json_response(body: String) -> Response<ServiceBody> {
    let mut response = Response::new(full_body(body));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

impl<B> Service<Request<B>> for GatewayAdminService {
    type Response = Response<ServiceBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/tenants") => {
                let tenants = self.resolver.all_tenants();
                let summaries: Vec<_> = tenants
                    .iter()
                    .map(|t| TenantSummary {
                        id: &t.id,
                        name: &t.name,
                    })
                    .collect();
                let response = match serde_json::to_string(&summaries) {
                    Ok(body) => json_response(body),
                    Err(err) => {
                        tracing::error!(error = %err, "failed to serialize tenants");
                        make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
                    }
                };
                Box::pin(async move { Ok(response) })
            }
            (&Method::POST, "/reload") => {
                let reloader = self.reloader.clone();
                Box::pin(async move {
                    let response = match reloader.reload().await {
                        Ok(generation) => json_response(
                            serde_json::json!({ "generation": generation }).to_string(),
                        ),
                        Err(err) => {
                            tracing::error!(error = %err, "reload requested through admin failed");
                            make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
                        }
                    };
                    Ok(response)
                })
            }
            (_, "/tenants" | "/reload") => Box::pin(async move {
                Ok(make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED))
            }),
            _ => self.probes.call(req),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Environment;
    use crate::identification::{HostStrategy, IdentificationStrategy};
    use http_body_util::BodyExt;
    use registry::source::JsonFileSource;
    use registry::TenantRegistry;
    use std::io::Write;

    const TENANTS: &str = r#"{"tenants": [
        {"id": "acme", "name": "Acme Corp", "hosts": ["acme.example.com"]}
    ]}"#;

    const TENANTS_RELOADED: &str = r#"{"tenants": [
        {"id": "acme", "name": "Acme Corp", "hosts": ["acme.example.com"]},
        {"id": "initech", "name": "Initech", "hosts": ["initech.example.com"]}
    ]}"#;

    fn request(method: Method, path: &str) -> Request<()> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(())
            .unwrap()
    }

    async fn body_json(response: Response<ServiceBody>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_and_reload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TENANTS.as_bytes()).unwrap();

        let registry = TenantRegistry::load(Arc::new(JsonFileSource::new(file.path()))).unwrap();
        let resolver = Arc::new(TenantResolver::new(
            IdentificationStrategy::Host(HostStrategy::default()),
            registry.clone(),
            Environment::default(),
        ));
        let reloader = Arc::new(Reloader::spawn(registry.clone(), None));
        let admin = GatewayAdminService::new(resolver, reloader);

        let response = admin.call(request(Method::GET, "/tenants")).await.unwrap();
        assert_eq!(
            body_json(response).await,
            serde_json::json!([{"id": "acme", "name": "Acme Corp"}])
        );

        std::fs::write(file.path(), TENANTS_RELOADED).unwrap();
        let response = admin.call(request(Method::POST, "/reload")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"generation": 2}));

        let response = admin.call(request(Method::GET, "/tenants")).await.unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);

        // A broken file fails the reload and keeps the last good snapshot
        std::fs::write(file.path(), "{").unwrap();
        let response = admin.call(request(Method::POST, "/reload")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(registry.generation(), 2);
        assert_eq!(registry.all().len(), 2);
    }

    #[tokio::test]
    async fn test_probes_and_methods() {
        let registry = crate::testutils::fixture_registry();
        let resolver = Arc::new(TenantResolver::new(
            IdentificationStrategy::Host(HostStrategy::default()),
            registry.clone(),
            Environment::default(),
        ));
        let admin =
            GatewayAdminService::new(resolver, Arc::new(Reloader::spawn(registry, None)));

        for path in ["/health", "/ready"] {
            let response = admin.call(request(Method::GET, path)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(
            admin
                .call(request(Method::GET, "/reload"))
                .await
                .unwrap()
                .status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            admin
                .call(request(Method::GET, "/missing"))
                .await
                .unwrap()
                .status(),
            StatusCode::NOT_FOUND
        );
    }
}

use http::header::{HOST, HeaderMap, HeaderName};
use http::{Method, Request};
use serde::Deserialize;
use shared::http::ConnectInfo;
use std::net::IpAddr;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Ambient deployment environment handed to dynamic identification callbacks.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Environment {
    #[serde(default = "default_environment_name")]
    pub name: String,
}

fn default_environment_name() -> String {
    "production".into()
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            name: default_environment_name(),
        }
    }
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Environment { name: name.into() }
    }

    pub fn is_development(&self) -> bool {
        self.name.eq_ignore_ascii_case("development")
    }
}

/// Everything an identification strategy may look at, captured from one
/// request before resolution starts.
#[derive(Clone, Debug, Default)]
pub struct ResolutionContext {
    method: Method,
    path: String,
    host: Option<String>,
    query: Vec<(String, String)>,
    source_addr: Option<IpAddr>,
    headers: HeaderMap,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_request<B>(req: &Request<B>) -> Self {
        // HTTP/2 requests carry the authority in the URI rather than a Host header
        let host = req
            .headers()
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_owned)
            .or_else(|| req.uri().authority().map(|a| a.as_str().to_owned()));

        let query = req
            .uri()
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let source_addr = req
            .extensions()
            .get::<ConnectInfo>()
            .map(|ConnectInfo(addr)| addr.ip());

        ResolutionContext {
            method: req.method().clone(),
            path: req.uri().path().to_owned(),
            host,
            query,
            source_addr,
            headers: req.headers().clone(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_source_addr(mut self, addr: IpAddr) -> Self {
        self.source_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The host as sent by the client, port included.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn source_addr(&self) -> Option<IpAddr> {
        self.source_addr
    }

    /// Right-most address of the X-Forwarded-For chain, the one appended by
    /// the proxy in front of us. Entries to its left are client controlled.
    pub fn forwarded_for(&self) -> Option<IpAddr> {
        let value = self.headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
        value.rsplit(',').next()?.trim().parse().ok()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[test]
    fn test_from_request() {
        let mut req = Request::builder()
            .uri("/hangfire/jobs?tenant=acme&tenant=globex&q=a%20b")
            .header(HOST, "acme.example.com:8080")
            .header("x-forwarded-for", "192.0.2.7, 10.0.0.1")
            .body(())
            .unwrap();
        let peer: SocketAddr = "10.1.2.3:55000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));

        let ctx = ResolutionContext::from_request(&req);
        assert_eq!(ctx.host(), Some("acme.example.com:8080"));
        assert_eq!(ctx.path(), "/hangfire/jobs");
        assert_eq!(ctx.method(), &Method::GET);
        // First occurrence wins
        assert_eq!(ctx.query_param("tenant"), Some("acme"));
        assert_eq!(ctx.query_param("q"), Some("a b"));
        assert_eq!(ctx.query_param("missing"), None);
        assert_eq!(ctx.source_addr(), Some(peer.ip()));
        // The proxy appends the peer it saw; earlier entries can be forged
        assert_eq!(ctx.forwarded_for(), Some("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_authority_fallback() {
        let req = Request::builder()
            .uri("https://globex.example.com/hangfire")
            .body(())
            .unwrap();
        let ctx = ResolutionContext::from_request(&req);
        assert_eq!(ctx.host(), Some("globex.example.com"));
        assert_eq!(ctx.source_addr(), None);
        assert_eq!(ctx.forwarded_for(), None);
    }

    #[test]
    fn test_environment() {
        assert_eq!(Environment::default().name, "production");
        assert!(Environment::new("Development").is_development());
        assert!(!Environment::default().is_development());
    }
}

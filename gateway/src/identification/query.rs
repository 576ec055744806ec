use crate::context::ResolutionContext;
use registry::TenantKey;

pub const DEFAULT_PARAMETER: &str = "tenant";

/// Identifies the tenant from a query parameter, falling back to the source
/// address when the parameter is absent. A present parameter always wins over
/// the address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryStringSourceIpStrategy {
    parameter: String,
    trust_forwarded_for: bool,
}

impl Default for QueryStringSourceIpStrategy {
    fn default() -> Self {
        QueryStringSourceIpStrategy {
            parameter: DEFAULT_PARAMETER.into(),
            trust_forwarded_for: false,
        }
    }
}

impl QueryStringSourceIpStrategy {
    pub fn new(parameter: impl Into<String>, trust_forwarded_for: bool) -> Self {
        QueryStringSourceIpStrategy {
            parameter: parameter.into(),
            trust_forwarded_for,
        }
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    pub fn identify(&self, ctx: &ResolutionContext) -> Option<TenantKey> {
        // An empty value counts as absent
        if let Some(value) = ctx.query_param(&self.parameter)
            && !value.trim().is_empty()
        {
            return Some(TenantKey::Id(value.trim().to_owned()));
        }

        let address = match self.trust_forwarded_for {
            true => ctx.forwarded_for().or_else(|| ctx.source_addr()),
            false => ctx.source_addr(),
        }?;

        // Dual-stack listeners report IPv4 peers as ::ffff:a.b.c.d
        Some(TenantKey::Address(address.to_canonical()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parameter_wins_over_address() {
        let strategy = QueryStringSourceIpStrategy::default();
        let ctx = ResolutionContext::new()
            .with_query_param("tenant", "acme")
            .with_source_addr(ip("10.0.0.2"));
        assert_eq!(strategy.identify(&ctx), Some(TenantKey::Id("acme".into())));
    }

    #[test]
    fn test_address_fallback() {
        let strategy = QueryStringSourceIpStrategy::default();
        let ctx = ResolutionContext::new().with_source_addr(ip("10.0.0.2"));
        assert_eq!(
            strategy.identify(&ctx),
            Some(TenantKey::Address(ip("10.0.0.2")))
        );

        let ctx = ResolutionContext::new()
            .with_query_param("tenant", "  ")
            .with_source_addr(ip("::ffff:10.0.0.2"));
        assert_eq!(
            strategy.identify(&ctx),
            Some(TenantKey::Address(ip("10.0.0.2")))
        );

        assert_eq!(strategy.identify(&ResolutionContext::new()), None);
    }

    #[test]
    fn test_custom_parameter() {
        let strategy = QueryStringSourceIpStrategy::new("org", false);
        let ctx = ResolutionContext::new()
            .with_query_param("tenant", "acme")
            .with_query_param("org", "globex");
        assert_eq!(strategy.identify(&ctx), Some(TenantKey::Id("globex".into())));
    }

    #[test]
    fn test_forwarded_for() {
        let req = Request::builder()
            .uri("/hangfire")
            .header("x-forwarded-for", "10.0.0.2, 192.0.2.7")
            .body(())
            .unwrap();
        let ctx = ResolutionContext::from_request(&req).with_source_addr(ip("10.0.0.1"));

        let untrusted = QueryStringSourceIpStrategy::default();
        assert_eq!(
            untrusted.identify(&ctx),
            Some(TenantKey::Address(ip("10.0.0.1")))
        );

        let trusted = QueryStringSourceIpStrategy::new("tenant", true);
        assert_eq!(
            trusted.identify(&ctx),
            Some(TenantKey::Address(ip("192.0.2.7")))
        );
    }

    #[test]
    fn test_spoofed_forwarded_entries_are_ignored() {
        // The client claims to be globex; the proxy appended the real peer
        let req = Request::builder()
            .uri("/hangfire")
            .header("x-forwarded-for", "10.0.0.2, 10.0.0.1")
            .body(())
            .unwrap();
        let ctx = ResolutionContext::from_request(&req);

        let trusted = QueryStringSourceIpStrategy::new("tenant", true);
        assert_eq!(
            trusted.identify(&ctx),
            Some(TenantKey::Address(ip("10.0.0.1")))
        );
    }
}

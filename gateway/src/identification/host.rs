use crate::context::ResolutionContext;
use registry::TenantKey;

/// Identifies the tenant by the host the request was sent to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostStrategy {
    case_fold: bool,
    strip_port: bool,
}

impl Default for HostStrategy {
    fn default() -> Self {
        HostStrategy {
            case_fold: true,
            strip_port: true,
        }
    }
}

impl HostStrategy {
    pub fn new(case_fold: bool, strip_port: bool) -> Self {
        HostStrategy {
            case_fold,
            strip_port,
        }
    }

    /// With `case_fold` off the host must match a configured host exactly,
    /// case included.
    pub fn identify(&self, ctx: &ResolutionContext) -> Option<TenantKey> {
        let host = self.normalize(ctx.host()?)?;
        Some(match self.case_fold {
            true => TenantKey::Host(host),
            false => TenantKey::ExactHost(host),
        })
    }

    pub fn normalize(&self, host: &str) -> Option<String> {
        let mut host = host.trim();

        if self.strip_port {
            host = strip_port(host);
        }
        let host = host.trim_end_matches('.');
        if host.is_empty() {
            return None;
        }

        Some(match self.case_fold {
            true => host.to_ascii_lowercase(),
            false => host.to_owned(),
        })
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal, e.g. "[::1]:8080"
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }

    match host.rsplit_once(':') {
        // More than one colon without brackets is not a host:port pair
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

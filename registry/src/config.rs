use crate::types::Tenant;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum SourceConfig {
    Json { path: PathBuf },
    Inline { tenants: Vec<Tenant> },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    pub source: SourceConfig,
    /// Reload the registry from its source on this interval. No periodic
    /// reload when unset.
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
}

impl Config {
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        let yaml = r#"
            source:
                type: json
                path: /etc/tenants.json
            refresh_interval_secs: 30
            "#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.source,
            SourceConfig::Json {
                path: "/etc/tenants.json".into()
            }
        );
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(30)));

        let yaml = r#"
            source:
                type: inline
                tenants:
                    - id: acme
                      name: Acme
                      hosts: [acme.example.com]
            "#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        match &config.source {
            SourceConfig::Inline { tenants } => assert_eq!(tenants[0].id, "acme"),
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(config.refresh_interval(), None);
    }
}

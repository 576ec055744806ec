pub mod config;
pub mod metrics_defs;
pub mod registry;
pub mod reloader;
pub mod source;
pub mod types;

use config::SourceConfig;
use source::{InlineSource, JsonFileSource, TenantSource};
use std::sync::Arc;

pub use registry::{LoadError, Snapshot, TenantRegistry, ValidationError};
pub use reloader::Reloader;
pub use types::{Tenant, TenantId, TenantKey};

pub fn get_source(config: SourceConfig) -> Arc<dyn TenantSource> {
    match config {
        SourceConfig::Json { path } => Arc::new(JsonFileSource::new(path)),
        SourceConfig::Inline { tenants } => Arc::new(InlineSource::new(tenants)),
    }
}

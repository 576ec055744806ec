//! Backing sources the tenant registry is populated from.

use crate::types::Tenant;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("could not read tenant document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse tenant document: {0}")]
    Parse(#[from] serde_json::Error),
}

pub trait TenantSource: Send + Sync {
    fn load(&self) -> Result<Vec<Tenant>, SourceError>;

    /// Short description used in logs.
    fn describe(&self) -> String;
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TenantDocument {
    tenants: Vec<Tenant>,
}

/// Parses a JSON document of the form `{"tenants": [...]}`.
fn parse_document(data: &str) -> Result<Vec<Tenant>, SourceError> {
    let document: TenantDocument = serde_json::from_str(data)?;
    Ok(document.tenants)
}

/// Fixture source holding tenants in memory, e.g. from the inline config section.
pub struct InlineSource {
    tenants: Vec<Tenant>,
}

impl InlineSource {
    pub fn new(tenants: Vec<Tenant>) -> Self {
        InlineSource { tenants }
    }
}

impl TenantSource for InlineSource {
    fn load(&self) -> Result<Vec<Tenant>, SourceError> {
        Ok(self.tenants.clone())
    }

    fn describe(&self) -> String {
        "inline".into()
    }
}

pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSource { path: path.into() }
    }
}

impl TenantSource for JsonFileSource {
    fn load(&self) -> Result<Vec<Tenant>, SourceError> {
        let data = fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_document(&data)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

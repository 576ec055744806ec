use std::io;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ValidationError),
    #[error("tenant registry error: {0}")]
    Registry(#[from] registry::LoadError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

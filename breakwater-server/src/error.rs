use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("server runtime error: {0}")]
    Runtime(String),
    #[error("server IO error: {0}")]
    Io(#[from] std::io::Error),
}

use thiserror::Error;

use crate::app::{BuildError, ConfigError};
use crate::domain::StoreError;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

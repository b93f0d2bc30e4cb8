//! Autoscaler error types.

use thiserror::Error;

/// Errors that abort a single pool's autoscale cycle.
#[derive(Debug, Error)]
pub enum AutoscaleError {
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    #[error("pool is not autoscaled: {0}")]
    NotAutoscaled(String),

    #[error("invalid autoscale config for pool {pool}: {reason}")]
    InvalidConfig { pool: String, reason: String },

    #[error("no region configured for pool {0} and no base region set")]
    MissingRegion(String),

    #[error("state store error: {0}")]
    State(#[from] fleetgrid_state::StateError),
}

pub type AutoscaleResult<T> = Result<T, AutoscaleError>;

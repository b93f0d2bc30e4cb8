//! Capacity change: how far a pool is from its target size.

use fleetgrid_state::{Pool, Scaleset};
use serde::Serialize;
use tracing::info;

use crate::error::{AutoscaleError, AutoscaleResult};

/// The signed distance between committed and wanted capacity for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Change {
    /// Instances already requested across all scale sets.
    pub current_size: u64,
    /// Demand clamped to the pool's bounds.
    pub target_size: u32,
    /// `target_size - current_size`. Positive grows, negative shrinks.
    pub change_size: i64,
}

/// Compute the capacity change for a pool.
///
/// Scale sets in every lifecycle state count toward `current_size`, so
/// capacity still being provisioned is never requested twice.
///
/// # Panics
///
/// Panics if the resulting size would fall outside `[min_size, max_size]`.
pub fn calculate_change(pool: &Pool, scalesets: &[Scaleset], needed: u32) -> AutoscaleResult<Change> {
    let config = pool
        .autoscale_config()
        .ok_or_else(|| AutoscaleError::NotAutoscaled(pool.name.clone()))?;
    config
        .validate()
        .map_err(|reason| AutoscaleError::InvalidConfig {
            pool: pool.name.clone(),
            reason,
        })?;

    let mut target = needed.max(config.min_size);
    if let Some(max) = config.max_bound() {
        target = target.min(max);
    }

    let current: u64 = scalesets.iter().map(|s| u64::from(s.size)).sum();
    let change_size = i64::from(target) - current as i64;

    let resulting = current as i64 + change_size;
    assert!(
        resulting >= i64::from(config.min_size)
            && config.max_bound().is_none_or(|max| resulting <= i64::from(max)),
        "change for pool {} leaves bounds: {resulting}",
        pool.name
    );

    info!(
        pool = %pool.name,
        current_size = current,
        new_size = target,
        needed,
        "autoscale status"
    );

    Ok(Change {
        current_size: current,
        target_size: target,
        change_size,
    })
}

//! Demand estimation: how many VMs a pool's buckets need.
//!
//! The aggregation rule lives behind [`DemandEstimator`] so it can be
//! swapped without touching the rest of the cycle.

use std::sync::Arc;

use fleetgrid_placement::Buckets;
use fleetgrid_state::{Pool, Task};
use serde::{Deserialize, Serialize};

/// Converts a pool's buckets into a required VM count.
pub trait DemandEstimator: Send + Sync {
    /// VMs needed by the buckets targeting `pool`. Buckets for other pools
    /// are ignored.
    fn needed(&self, pool: &Pool, buckets: &Buckets) -> u32;
}

/// A bucket needs as many VMs as its widest task asks for, since colocated
/// tasks share machines. Pool demand is the sum over buckets.
#[derive(Debug, Clone, Copy, Default)]
pub struct WidestTaskDemand;

impl DemandEstimator for WidestTaskDemand {
    fn needed(&self, pool: &Pool, buckets: &Buckets) -> u32 {
        buckets
            .values()
            .map(|members| {
                targeting(pool, members)
                    .map(Task::vm_count)
                    .max()
                    .unwrap_or(0)
            })
            .fold(0u32, u32::saturating_add)
    }
}

/// Every task counts on its own, regardless of colocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummedTaskDemand;

impl DemandEstimator for SummedTaskDemand {
    fn needed(&self, pool: &Pool, buckets: &Buckets) -> u32 {
        buckets
            .values()
            .flat_map(|members| targeting(pool, members))
            .map(Task::vm_count)
            .fold(0u32, u32::saturating_add)
    }
}

fn targeting<'a>(pool: &'a Pool, members: &'a [Task]) -> impl Iterator<Item = &'a Task> + 'a {
    members
        .iter()
        .filter(move |t| t.pool_name() == Some(pool.name.as_str()))
}

/// Named aggregation rules, selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandRule {
    #[default]
    Widest,
    Summed,
}

impl DemandRule {
    pub fn estimator(self) -> Arc<dyn DemandEstimator> {
        match self {
            DemandRule::Widest => Arc::new(WidestTaskDemand),
            DemandRule::Summed => Arc::new(SummedTaskDemand),
        }
    }
}

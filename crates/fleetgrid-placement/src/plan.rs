//! Scale-set plans: turn a capacity delta into per-scale-set changes.
//!
//! Given the scale sets currently backing a pool and the number of
//! instances to add (or remove), the planners decide:
//! 1. Which running scale sets change, and to what size
//! 2. How many new scale sets to create, and how large (growth only)
//!
//! Scale sets are always visited in a fixed order keyed by `scaleset_id`,
//! so repeated cycles over the same state make the same decision. Growth
//! fills the lowest IDs first; shrinking drains the highest IDs first.

use fleetgrid_state::Scaleset;
use serde::Serialize;
use tracing::debug;

/// Maximum number of instances a single scale set may hold.
pub const SCALESET_MAX_SIZE: u32 = 1000;

/// A growth decision for a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrowthPlan {
    /// Existing scale sets to grow, with their new size.
    pub existing: Vec<(Scaleset, u32)>,
    /// Size of each scale set to create, in creation order.
    pub new_scalesets: Vec<u32>,
}

impl GrowthPlan {
    /// Total instances this plan adds.
    pub fn added(&self) -> u64 {
        let grown: u64 = self
            .existing
            .iter()
            .map(|(ss, new_size)| u64::from(new_size - ss.size))
            .sum();
        grown + self.new_scalesets.iter().map(|&s| u64::from(s)).sum::<u64>()
    }

    pub fn is_empty(&self) -> bool {
        self.existing.is_empty() && self.new_scalesets.is_empty()
    }
}

/// A shrink decision for a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShrinkPlan {
    /// Existing scale sets to shrink, with their new size. Zero means delete.
    pub existing: Vec<(Scaleset, u32)>,
}

impl ShrinkPlan {
    /// Total instances this plan removes.
    pub fn removed(&self) -> u64 {
        self.existing
            .iter()
            .map(|(ss, new_size)| u64::from(ss.size - new_size))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.existing.is_empty()
    }
}

/// Plan how to add `to_add` instances across `scalesets`.
///
/// Only running scale sets grow. Each is filled up to `max_size`, lowest
/// `scaleset_id` first; whatever is left goes into new scale sets of at most
/// `max_size` each, the last one holding the remainder. A `max_size` above
/// [`SCALESET_MAX_SIZE`] is lowered to it.
///
/// # Panics
///
/// Panics if `max_size` is zero, or if the computed plan does not add exactly
/// `to_add` instances or exceeds the ceiling anywhere.
pub fn plan_growth(scalesets: &[Scaleset], to_add: u32, max_size: u32) -> GrowthPlan {
    assert!(max_size > 0, "scale set ceiling must be positive");
    let max_size = max_size.min(SCALESET_MAX_SIZE);

    let mut eligible: Vec<&Scaleset> = scalesets.iter().filter(|s| s.state.can_resize()).collect();
    eligible.sort_by(|a, b| a.scaleset_id.cmp(&b.scaleset_id));

    let mut remaining = to_add;
    let mut plan = GrowthPlan::default();

    for scaleset in eligible {
        if remaining == 0 {
            break;
        }
        if scaleset.size >= max_size {
            continue;
        }
        let growth = (max_size - scaleset.size).min(remaining);
        plan.existing.push((scaleset.clone(), scaleset.size + growth));
        remaining -= growth;
        debug!(
            scaleset = %scaleset.scaleset_id,
            from = scaleset.size,
            to = scaleset.size + growth,
            "planned scale set growth"
        );
    }

    while remaining > 0 {
        let size = max_size.min(remaining);
        plan.new_scalesets.push(size);
        remaining -= size;
    }

    assert_eq!(plan.added(), u64::from(to_add), "growth plan does not sum to delta");
    assert!(
        plan.existing.iter().all(|&(_, size)| size <= max_size)
            && plan.new_scalesets.iter().all(|&size| size <= max_size),
        "growth plan exceeds scale set ceiling"
    );
    plan
}

/// Plan how to remove up to `to_remove` instances from `scalesets`.
///
/// Only running scale sets shrink, highest `scaleset_id` first. A running
/// scale set that is already empty, or that would become empty, is planned
/// at size zero so it gets deleted. If running scale sets hold fewer than
/// `to_remove` instances, the plan removes what it can.
pub fn plan_shrink(scalesets: &[Scaleset], to_remove: u32) -> ShrinkPlan {
    let mut eligible: Vec<&Scaleset> = scalesets.iter().filter(|s| s.state.can_resize()).collect();
    eligible.sort_by(|a, b| b.scaleset_id.cmp(&a.scaleset_id));

    let mut remaining = to_remove;
    let mut plan = ShrinkPlan::default();

    for scaleset in eligible {
        if scaleset.size == 0 {
            plan.existing.push((scaleset.clone(), 0));
            continue;
        }
        if remaining == 0 {
            continue;
        }
        let cut = scaleset.size.min(remaining);
        plan.existing.push((scaleset.clone(), scaleset.size - cut));
        remaining -= cut;
        debug!(
            scaleset = %scaleset.scaleset_id,
            from = scaleset.size,
            to = scaleset.size - cut,
            "planned scale set shrink"
        );
    }

    assert!(
        plan.removed() <= u64::from(to_remove),
        "shrink plan removes more than requested"
    );
    plan
}

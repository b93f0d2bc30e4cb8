//! fleetgrid-autoscale: task-driven pool sizing.
//!
//! Reads pools, scale sets, and non-terminal tasks from the state store,
//! estimates how many VMs each autoscaled pool needs, and issues grow,
//! create, or shrink requests through a [`Provisioner`]. The actual VM
//! changes are performed by the provisioner.
//!
//! # Scaling Algorithm
//!
//! ```text
//! buckets = bucket_tasks(non-terminal tasks of pool)
//! needed  = estimator.needed(pool, buckets)
//! current = sum(scaleset.size)              // every state counts
//! target  = clamp(needed, min_size, max_size)
//! change  = target - current
//!
//! if change > 0:  plan_growth(running scale sets, change)   // resize + create
//! if change < 0:  plan_shrink(running scale sets, -change)  // shrink or delete
//! else:           plan_shrink(running scale sets, 0)        // delete empties
//! ```
//!
//! The loop keeps no state between cycles. A failed or missed request is
//! re-derived from observed state on the next cycle.

pub mod change;
pub mod demand;
pub mod error;
pub mod provision;
pub mod scaler;

pub use change::{Change, calculate_change};
pub use demand::{DemandEstimator, DemandRule, SummedTaskDemand, WidestTaskDemand};
pub use error::{AutoscaleError, AutoscaleResult};
pub use provision::{CreateScaleset, Provisioner};
pub use scaler::{AutoscaleSettings, Autoscaler, CycleOutcome, Decision, SkipReason};

//! FleetGrid placement: task bucketing and scale-set bin-packing.
//!
//! This crate holds the pure, side-effect-free halves of the autoscaler.
//! It never talks to the store or the cloud. Instead it partitions tasks
//! into shareable groups and turns a capacity delta into a concrete plan
//! that `fleetgrid-autoscale` executes.
//!
//! # Components
//!
//! - **`bucket`**: Partition tasks into colocation buckets
//! - **`plan`**: Growth and shrink plans under the per-scale-set ceiling

pub mod bucket;
pub mod plan;

pub use bucket::{BucketKey, Buckets, bucket_tasks};
pub use plan::{GrowthPlan, SCALESET_MAX_SIZE, ShrinkPlan, plan_growth, plan_shrink};

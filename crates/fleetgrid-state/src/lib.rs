//! fleetgrid-state: embedded state store for FleetGrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for worker pools, their scale sets, and the fuzzing tasks that
//! drive autoscaling.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Scale sets use the composite key `{pool_name}:{scaleset_id}` so listing
//! a pool's scale sets is a prefix scan.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;

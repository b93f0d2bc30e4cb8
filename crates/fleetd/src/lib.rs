//! The FleetGrid daemon.
//!
//! Library half of the daemon. `main.rs` parses the command line and calls
//! into [`supervise`] or [`plan_decisions`].

pub mod config;
pub mod daemon;
pub mod provisioner;

pub use config::{FleetConfig, LogFormat};
pub use daemon::{plan_decisions, supervise};
pub use provisioner::StoreProvisioner;

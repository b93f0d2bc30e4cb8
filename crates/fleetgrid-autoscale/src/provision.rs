//! Provisioning seam: where scaling decisions leave the autoscaler.
//!
//! Implementations talk to whatever actually owns the VMs. Calls are
//! eventually consistent: a resize returning `Ok` only means the request
//! was accepted, and the next cycle observes the result through the store.

use std::future::Future;

use fleetgrid_state::ScalesetId;
use serde::Serialize;

/// Parameters for a brand-new scale set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateScaleset {
    pub pool_name: String,
    pub size: u32,
    pub image: String,
    pub vm_sku: String,
    pub region: String,
    pub spot_instances: bool,
    pub ephemeral_os_disks: bool,
}

/// Performs capacity changes on behalf of the autoscaler.
///
/// Every call should be idempotent or safe to repeat; the autoscaler never
/// retries within a cycle and relies on the next cycle instead.
pub trait Provisioner: Send + Sync + 'static {
    /// Grow an existing scale set to `new_size`.
    fn resize(&self, scaleset_id: &str, new_size: u32) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Create a new scale set, returning its ID.
    fn create_scaleset(
        &self,
        request: CreateScaleset,
    ) -> impl Future<Output = anyhow::Result<ScalesetId>> + Send;

    /// Shrink a scale set to `new_size`, or delete it when `new_size` is 0.
    fn shrink_or_delete(
        &self,
        scaleset_id: &str,
        new_size: u32,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

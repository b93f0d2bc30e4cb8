//! Store-backed provisioner.
//!
//! Applies autoscaler requests directly to the scale set records in the
//! state store. A resize or create is visible to the very next cycle, which
//! makes this the provisioner for single-node runs and for dry runs against
//! a copy of production state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use fleetgrid_autoscale::{CreateScaleset, Provisioner};
use fleetgrid_state::{Scaleset, ScalesetId, ScalesetState, StateError, StateStore};
use tracing::{debug, info};

pub struct StoreProvisioner {
    state: StateStore,
    next_id: AtomicU64,
}

impl StoreProvisioner {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            next_id: AtomicU64::new(0),
        }
    }

    fn load(&self, scaleset_id: &str) -> anyhow::Result<Scaleset> {
        self.state
            .find_scaleset(scaleset_id)?
            .ok_or_else(|| StateError::NotFound(format!("scaleset {scaleset_id}")).into())
    }

    /// `{pool}-{unix seconds}-{counter}`, skipping any ID already stored so
    /// a restart within the same second never overwrites a record.
    fn allocate_id(&self, pool_name: &str) -> anyhow::Result<ScalesetId> {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        loop {
            let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
            let id = format!("{pool_name}-{epoch}-{seq}");
            if self.state.find_scaleset(&id)?.is_none() {
                return Ok(id);
            }
            debug!(scaleset = %id, "scaleset id taken, trying the next one");
        }
    }
}

impl Provisioner for StoreProvisioner {
    async fn resize(&self, scaleset_id: &str, new_size: u32) -> anyhow::Result<()> {
        let mut scaleset = self.load(scaleset_id)?;
        debug!(scaleset = scaleset_id, from = scaleset.size, to = new_size, "resizing scaleset");
        scaleset.size = new_size;
        scaleset.state = ScalesetState::Running;
        self.state.put_scaleset(&scaleset)?;
        Ok(())
    }

    async fn create_scaleset(&self, request: CreateScaleset) -> anyhow::Result<ScalesetId> {
        let scaleset = Scaleset {
            scaleset_id: self.allocate_id(&request.pool_name)?,
            pool_name: request.pool_name,
            state: ScalesetState::Running,
            size: request.size,
            vm_sku: request.vm_sku,
            image: request.image,
            region: request.region,
            spot_instances: request.spot_instances,
        };
        self.state.put_scaleset(&scaleset)?;
        info!(
            pool = %scaleset.pool_name,
            scaleset = %scaleset.scaleset_id,
            size = scaleset.size,
            "scaleset created"
        );
        Ok(scaleset.scaleset_id)
    }

    async fn shrink_or_delete(&self, scaleset_id: &str, new_size: u32) -> anyhow::Result<()> {
        let mut scaleset = self.load(scaleset_id)?;
        if new_size == 0 {
            self.state
                .delete_scaleset(&scaleset.pool_name, &scaleset.scaleset_id)?;
            info!(pool = %scaleset.pool_name, scaleset = scaleset_id, "scaleset deleted");
        } else {
            debug!(scaleset = scaleset_id, from = scaleset.size, to = new_size, "shrinking scaleset");
            scaleset.size = new_size;
            self.state.put_scaleset(&scaleset)?;
        }
        Ok(())
    }
}

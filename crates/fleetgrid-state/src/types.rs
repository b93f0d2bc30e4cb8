//! Domain types for the FleetGrid state store.
//!
//! These types represent the persisted state of worker pools, the scale
//! sets backing them, and the fuzzing tasks scheduled onto them. All types
//! are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

/// Unique name of a worker pool.
pub type PoolName = String;

/// Unique identifier for a scale set.
pub type ScalesetId = String;

/// Unique identifier for a task.
pub type TaskId = String;

/// Identifier of the job a task belongs to.
pub type JobId = String;

/// Operating system a pool or task targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Os {
    Linux,
    Windows,
}

/// CPU architecture of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    X86_64,
}

// ── Task ──────────────────────────────────────────────────────────

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Init,
    Waiting,
    Scheduled,
    SettingUp,
    Running,
    Stopping,
    Stopped,
    WaitJob,
}

impl TaskState {
    /// Stopping and stopped tasks no longer need capacity.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Stopping | TaskState::Stopped)
    }
}

/// Role a container plays for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    Setup,
    Crashes,
    Inputs,
    ReadonlyInputs,
    UniqueInputs,
    Coverage,
    Reports,
    UniqueReports,
    NoRepro,
    Tools,
    Analysis,
}

/// A (role, container-name) pair bound to a task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerBinding {
    #[serde(rename = "type")]
    pub kind: ContainerType,
    pub name: String,
}

impl ContainerBinding {
    pub fn new(kind: ContainerType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Pool placement requested by a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPool {
    pub pool_name: PoolName,
    /// Number of VMs the task wants to run on in parallel.
    pub count: u32,
}

/// A fuzzing task as seen by the autoscaler.
///
/// `os` and `pool` are optional on the record; tasks missing either are
/// malformed and skipped during bucketing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub job_id: JobId,
    pub state: TaskState,
    pub os: Option<Os>,
    pub pool: Option<TaskPool>,
    /// `None` for tasks created before colocation existed.
    #[serde(default)]
    pub colocate: Option<bool>,
    #[serde(default)]
    pub containers: Vec<ContainerBinding>,
}

impl Task {
    /// Name of the pool this task targets, if any.
    pub fn pool_name(&self) -> Option<&str> {
        self.pool.as_ref().map(|p| p.pool_name.as_str())
    }

    /// Requested parallelism, zero when the task has no pool.
    pub fn vm_count(&self) -> u32 {
        self.pool.as_ref().map_or(0, |p| p.count)
    }
}

// ── Pool ──────────────────────────────────────────────────────────

/// Lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Init,
    Running,
    Shutdown,
    Halt,
}

impl PoolState {
    /// Pools that are initializing or running accept work and may scale.
    pub fn is_available(self) -> bool {
        matches!(self, PoolState::Init | PoolState::Running)
    }
}

/// Operator-configured autoscaling bounds and VM template for a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscaleConfig {
    /// Minimum total instances across the pool's scale sets.
    #[serde(default)]
    pub min_size: u32,
    /// Maximum total instances; unbounded when `None` or `0`.
    #[serde(default)]
    pub max_size: Option<u32>,
    pub image: String,
    pub vm_sku: String,
    /// Region for new scale sets; the service default is used when `None`.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub spot_instances: bool,
    #[serde(default)]
    pub ephemeral_os_disks: bool,
}

impl AutoscaleConfig {
    /// Effective upper bound. A stored `max_size` of 0 means no bound.
    pub fn max_bound(&self) -> Option<u32> {
        self.max_size.filter(|&max| max > 0)
    }

    /// Check the bounds are coherent.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_bound() {
            if self.min_size > max {
                return Err(format!(
                    "min_size {} is greater than max_size {max}",
                    self.min_size
                ));
            }
        }
        Ok(())
    }
}

/// A named pool of worker capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub name: PoolName,
    pub pool_id: String,
    pub os: Os,
    pub arch: Architecture,
    /// Unmanaged pools are provisioned by the operator, never autoscaled.
    pub managed: bool,
    pub state: PoolState,
    pub autoscale: Option<AutoscaleConfig>,
}

impl Pool {
    /// The autoscale config, if this pool takes part in autoscaling.
    pub fn autoscale_config(&self) -> Option<&AutoscaleConfig> {
        if self.managed {
            self.autoscale.as_ref()
        } else {
            None
        }
    }
}

// ── Scaleset ──────────────────────────────────────────────────────

/// Lifecycle state of a scale set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalesetState {
    Init,
    Setup,
    Resize,
    Running,
    Shutdown,
    Halt,
    CreationFailed,
}

impl ScalesetState {
    /// Only running scale sets may be grown or shrunk by the autoscaler.
    pub fn can_resize(self) -> bool {
        self == ScalesetState::Running
    }
}

/// A resizable group of homogeneous VMs backing a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scaleset {
    pub scaleset_id: ScalesetId,
    pub pool_name: PoolName,
    pub state: ScalesetState,
    /// Currently requested instance count.
    pub size: u32,
    pub vm_sku: String,
    pub image: String,
    pub region: String,
    #[serde(default)]
    pub spot_instances: bool,
}

impl Scaleset {
    /// Build the composite key for the scalesets table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.pool_name, self.scaleset_id)
    }
}

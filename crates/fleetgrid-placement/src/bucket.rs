//! Task bucketing: which tasks may share a set of machines.
//!
//! A bucket is a group of tasks that can run on the same machines. Tasks
//! only share a bucket when every one of them opted into colocation and
//! they agree on job, OS, pool, and the set of bound containers. Anything
//! else lands in a bucket of its own, keyed by task ID so it can never merge
//! with another task, even one with identical attributes.
//!
//! Buckets are recomputed from a task snapshot every cycle and never stored.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use fleetgrid_state::{ContainerBinding, JobId, Os, PoolName, Task, TaskId};
use tracing::{debug, warn};

/// Identity of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    /// A task that must not share machines.
    Unique(TaskId),
    /// Colocated tasks with matching job, OS, pool, and containers.
    Shared {
        job_id: JobId,
        os: Os,
        pool_name: PoolName,
        /// Compared as a set so binding order never splits a bucket.
        containers: BTreeSet<ContainerBinding>,
    },
}

impl BucketKey {
    /// Compute the key for a task, or `None` if the task lacks a pool or OS.
    pub fn for_task(task: &Task) -> Option<Self> {
        let pool = task.pool.as_ref()?;
        let os = task.os?;

        if task.colocate != Some(true) {
            return Some(BucketKey::Unique(task.task_id.clone()));
        }

        Some(BucketKey::Shared {
            job_id: task.job_id.clone(),
            os,
            pool_name: pool.pool_name.clone(),
            containers: task.containers.iter().cloned().collect(),
        })
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, BucketKey::Shared { .. })
    }
}

/// Buckets in key order, each bucket's tasks ordered by task ID.
pub type Buckets = BTreeMap<BucketKey, Vec<Task>>;

/// Partition tasks into colocation buckets.
///
/// Malformed tasks are logged and left out. The result does not depend on
/// the order of `tasks`.
///
/// # Panics
///
/// Panics if the resulting partition is not total and disjoint, which would
/// mean the keying itself is broken.
pub fn bucket_tasks(tasks: &[Task]) -> Buckets {
    let mut buckets = Buckets::new();
    let mut accepted = 0usize;

    for task in tasks {
        let Some(key) = BucketKey::for_task(task) else {
            warn!(
                task_id = %task.task_id,
                job_id = %task.job_id,
                has_pool = task.pool.is_some(),
                has_os = task.os.is_some(),
                "skipping malformed task"
            );
            continue;
        };
        buckets.entry(key).or_default().push(task.clone());
        accepted += 1;
    }

    for members in buckets.values_mut() {
        members.sort_by(|a, b| a.task_id.cmp(&b.task_id));
    }

    check_partition(&buckets, accepted);

    debug!(
        tasks = accepted,
        skipped = tasks.len() - accepted,
        buckets = buckets.len(),
        "tasks bucketed"
    );
    buckets
}

fn check_partition(buckets: &Buckets, accepted: usize) {
    let placed: usize = buckets.values().map(Vec::len).sum();
    assert_eq!(placed, accepted, "bucketing lost or duplicated tasks");

    let mut owner: HashMap<&str, &BucketKey> = HashMap::new();
    for (key, members) in buckets {
        assert!(!members.is_empty(), "empty bucket {key:?}");
        for task in members {
            if let Some(prev) = owner.insert(task.task_id.as_str(), key) {
                assert_eq!(
                    prev, key,
                    "task {} appears in more than one bucket",
                    task.task_id
                );
            }
        }
    }
}

//! StateStore: redb-backed state persistence for FleetGrid.
//!
//! Provides typed CRUD operations over pools, scale sets, and tasks. All
//! values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableHandle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError::Storage` tagged with the
/// failing step.
macro_rules! storage_err {
    ($op:literal) => {
        |e| StateError::Storage {
            op: $op,
            message: e.to_string(),
        }
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| StateError::Open(e.to_string()))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(|e| StateError::Open(e.to_string()))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(storage_err!("begin_write"))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [POOLS, SCALESETS, TASKS] {
            txn.open_table(table).map_err(storage_err!("open_table"))?;
        }
        txn.commit().map_err(storage_err!("commit"))?;
        Ok(())
    }

    // ── Pools ──────────────────────────────────────────────────────

    /// Insert or update a pool.
    pub fn put_pool(&self, pool: &Pool) -> StateResult<()> {
        check_key_segment(&pool.name)?;
        self.put_record(POOLS, &pool.name, pool)?;
        debug!(pool = %pool.name, "pool stored");
        Ok(())
    }

    /// Get a pool by name.
    pub fn get_pool(&self, name: &str) -> StateResult<Option<Pool>> {
        self.get_record(POOLS, name)
    }

    /// List all pools, ordered by name.
    pub fn list_pools(&self) -> StateResult<Vec<Pool>> {
        self.scan(POOLS, None)
    }

    /// Delete a pool by name. Returns true if it existed.
    pub fn delete_pool(&self, name: &str) -> StateResult<bool> {
        let existed = self.remove_record(POOLS, name)?;
        debug!(pool = %name, existed, "pool deleted");
        Ok(existed)
    }

    // ── Scalesets ──────────────────────────────────────────────────

    /// Insert or update a scale set.
    pub fn put_scaleset(&self, scaleset: &Scaleset) -> StateResult<()> {
        check_key_segment(&scaleset.pool_name)?;
        check_key_segment(&scaleset.scaleset_id)?;
        self.put_record(SCALESETS, &scaleset.table_key(), scaleset)
    }

    /// Get a scale set of a pool by ID.
    pub fn get_scaleset(&self, pool_name: &str, scaleset_id: &str) -> StateResult<Option<Scaleset>> {
        self.get_record(SCALESETS, &format!("{pool_name}:{scaleset_id}"))
    }

    /// Find a scale set by ID regardless of pool.
    pub fn find_scaleset(&self, scaleset_id: &str) -> StateResult<Option<Scaleset>> {
        let all: Vec<Scaleset> = self.scan(SCALESETS, None)?;
        Ok(all.into_iter().find(|s| s.scaleset_id == scaleset_id))
    }

    /// List all scale sets backing a pool.
    pub fn list_scalesets(&self, pool_name: &str) -> StateResult<Vec<Scaleset>> {
        self.scan(SCALESETS, Some(&format!("{pool_name}:")))
    }

    /// Delete a scale set. Returns true if it existed.
    pub fn delete_scaleset(&self, pool_name: &str, scaleset_id: &str) -> StateResult<bool> {
        self.remove_record(SCALESETS, &format!("{pool_name}:{scaleset_id}"))
    }

    // ── Tasks ──────────────────────────────────────────────────────

    /// Insert or update a task.
    pub fn put_task(&self, task: &Task) -> StateResult<()> {
        check_key_segment(&task.task_id)?;
        self.put_record(TASKS, &task.task_id, task)
    }

    /// Get a task by ID.
    pub fn get_task(&self, task_id: &str) -> StateResult<Option<Task>> {
        self.get_record(TASKS, task_id)
    }

    /// List the tasks targeting a pool, optionally skipping stopping and
    /// stopped tasks.
    pub fn list_tasks(&self, pool_name: &str, exclude_terminal: bool) -> StateResult<Vec<Task>> {
        let all: Vec<Task> = self.scan(TASKS, None)?;
        Ok(all
            .into_iter()
            .filter(|t| t.pool_name() == Some(pool_name))
            .filter(|t| !(exclude_terminal && t.state.is_terminal()))
            .collect())
    }

    /// Delete a task by ID. Returns true if it existed.
    pub fn delete_task(&self, task_id: &str) -> StateResult<bool> {
        self.remove_record(TASKS, task_id)
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn put_record<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| StateError::Encode {
            table: table.name().to_string(),
            message: e.to_string(),
        })?;
        let txn = self.db.begin_write().map_err(storage_err!("begin_write"))?;
        {
            let mut t = txn.open_table(table).map_err(storage_err!("open_table"))?;
            t.insert(key, bytes.as_slice())
                .map_err(storage_err!("insert"))?;
        }
        txn.commit().map_err(storage_err!("commit"))?;
        Ok(())
    }

    fn get_record<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(storage_err!("begin_read"))?;
        let t = txn.open_table(table).map_err(storage_err!("open_table"))?;
        match t.get(key).map_err(storage_err!("get"))? {
            Some(guard) => decode(table, guard.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Decode every record, or only those whose key starts with `prefix`.
    fn scan<T: DeserializeOwned>(&self, table: Table, prefix: Option<&str>) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(storage_err!("begin_read"))?;
        let t = txn.open_table(table).map_err(storage_err!("open_table"))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(storage_err!("iter"))? {
            let (key, value) = entry.map_err(storage_err!("iter"))?;
            if prefix.is_none_or(|p| key.value().starts_with(p)) {
                results.push(decode(table, value.value())?);
            }
        }
        Ok(results)
    }

    fn remove_record(&self, table: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(storage_err!("begin_write"))?;
        let existed;
        {
            let mut t = txn.open_table(table).map_err(storage_err!("open_table"))?;
            existed = t.remove(key).map_err(storage_err!("remove"))?.is_some();
        }
        txn.commit().map_err(storage_err!("commit"))?;
        Ok(existed)
    }
}

fn decode<T: DeserializeOwned>(table: Table, bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Decode {
        table: table.name().to_string(),
        message: e.to_string(),
    })
}

fn check_key_segment(segment: &str) -> StateResult<()> {
    if segment.is_empty() || segment.contains(':') {
        return Err(StateError::InvalidKey(segment.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(name: &str) -> Pool {
        Pool {
            name: name.to_string(),
            pool_id: format!("{name}-id"),
            os: Os::Linux,
            arch: Architecture::X86_64,
            managed: true,
            state: PoolState::Running,
            autoscale: Some(AutoscaleConfig {
                min_size: 0,
                max_size: Some(100),
                image: "Canonical:UbuntuServer:18.04-LTS:latest".to_string(),
                vm_sku: "Standard_D2s_v3".to_string(),
                region: Some("eastus".to_string()),
                spot_instances: false,
                ephemeral_os_disks: false,
            }),
        }
    }

    fn test_scaleset(pool_name: &str, id: &str, size: u32) -> Scaleset {
        Scaleset {
            scaleset_id: id.to_string(),
            pool_name: pool_name.to_string(),
            state: ScalesetState::Running,
            size,
            vm_sku: "Standard_D2s_v3".to_string(),
            image: "Canonical:UbuntuServer:18.04-LTS:latest".to_string(),
            region: "eastus".to_string(),
            spot_instances: false,
        }
    }

    fn test_task(id: &str, pool_name: &str, state: TaskState) -> Task {
        Task {
            task_id: id.to_string(),
            job_id: "job-1".to_string(),
            state,
            os: Some(Os::Linux),
            pool: Some(TaskPool {
                pool_name: pool_name.to_string(),
                count: 1,
            }),
            colocate: Some(true),
            containers: vec![ContainerBinding::new(ContainerType::Setup, "setup")],
        }
    }

    // ── Pool CRUD ──────────────────────────────────────────────────

    #[test]
    fn pool_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let pool = test_pool("linux");

        store.put_pool(&pool).unwrap();
        assert_eq!(store.get_pool("linux").unwrap(), Some(pool));
    }

    #[test]
    fn pool_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_pool("nope").unwrap().is_none());
    }

    #[test]
    fn pool_list_is_ordered_by_name() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_pool(&test_pool("windows")).unwrap();
        store.put_pool(&test_pool("linux")).unwrap();

        let names: Vec<_> = store
            .list_pools()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["linux", "windows"]);
    }

    #[test]
    fn pool_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut pool = test_pool("linux");
        store.put_pool(&pool).unwrap();

        pool.managed = false;
        store.put_pool(&pool).unwrap();

        assert!(!store.get_pool("linux").unwrap().unwrap().managed);
        assert_eq!(store.list_pools().unwrap().len(), 1);
    }

    #[test]
    fn pool_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_pool(&test_pool("linux")).unwrap();

        assert!(store.delete_pool("linux").unwrap());
        assert!(!store.delete_pool("linux").unwrap());
        assert!(store.get_pool("linux").unwrap().is_none());
    }

    #[test]
    fn pool_name_with_separator_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let result = store.put_pool(&test_pool("bad:name"));
        assert!(matches!(result, Err(StateError::InvalidKey(_))));
    }

    // ── Scaleset CRUD ──────────────────────────────────────────────

    #[test]
    fn scaleset_list_for_pool() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_scaleset(&test_scaleset("linux", "ss-1", 3)).unwrap();
        store.put_scaleset(&test_scaleset("linux", "ss-2", 5)).unwrap();
        store.put_scaleset(&test_scaleset("windows", "ss-3", 1)).unwrap();

        assert_eq!(store.list_scalesets("linux").unwrap().len(), 2);
        assert_eq!(store.list_scalesets("windows").unwrap().len(), 1);
        assert!(store.list_scalesets("lin").unwrap().is_empty());
    }

    #[test]
    fn scaleset_get_find_and_delete() {
        let store = StateStore::open_in_memory().unwrap();
        let ss = test_scaleset("linux", "ss-1", 3);
        store.put_scaleset(&ss).unwrap();

        assert_eq!(store.get_scaleset("linux", "ss-1").unwrap(), Some(ss.clone()));
        assert_eq!(store.find_scaleset("ss-1").unwrap(), Some(ss));
        assert!(store.find_scaleset("ss-9").unwrap().is_none());

        assert!(store.delete_scaleset("linux", "ss-1").unwrap());
        assert!(store.get_scaleset("linux", "ss-1").unwrap().is_none());
    }

    // ── Task CRUD ──────────────────────────────────────────────────

    #[test]
    fn task_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let task = test_task("t1", "linux", TaskState::Waiting);

        store.put_task(&task).unwrap();
        assert_eq!(store.get_task("t1").unwrap(), Some(task));
    }

    #[test]
    fn list_tasks_filters_pool_and_terminal_states() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_task(&test_task("t1", "linux", TaskState::Running)).unwrap();
        store.put_task(&test_task("t2", "linux", TaskState::Stopped)).unwrap();
        store.put_task(&test_task("t3", "linux", TaskState::Stopping)).unwrap();
        store.put_task(&test_task("t4", "windows", TaskState::Waiting)).unwrap();

        let mut orphan = test_task("t5", "linux", TaskState::Waiting);
        orphan.pool = None;
        store.put_task(&orphan).unwrap();

        let live = store.list_tasks("linux", true).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].task_id, "t1");

        assert_eq!(store.list_tasks("linux", false).unwrap().len(), 3);
    }

    #[test]
    fn task_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_task(&test_task("t1", "linux", TaskState::Waiting)).unwrap();

        assert!(store.delete_task("t1").unwrap());
        assert!(!store.delete_task("t1").unwrap());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn corrupt_record_reports_its_table() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_record(POOLS, "broken", &"not a pool").unwrap();

        match store.get_pool("broken") {
            Err(StateError::Decode { table, .. }) => assert_eq!(table, "pools"),
            other => panic!("expected decode error, got {other:?}"),
        }
        assert!(matches!(store.list_pools(), Err(StateError::Decode { .. })));
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_pool(&test_pool("linux")).unwrap();
            store.put_scaleset(&test_scaleset("linux", "ss-1", 7)).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_pool("linux").unwrap().is_some());
        assert_eq!(store.list_scalesets("linux").unwrap()[0].size, 7);
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_pools().unwrap().is_empty());
        assert!(store.list_scalesets("any").unwrap().is_empty());
        assert!(store.list_tasks("any", true).unwrap().is_empty());
        assert!(!store.delete_pool("nope").unwrap());
        assert!(!store.delete_scaleset("any", "nope").unwrap());
        assert!(!store.delete_task("nope").unwrap());
    }
}

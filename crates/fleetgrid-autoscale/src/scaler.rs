//! Autoscaler: task-driven pool sizing.
//!
//! Each cycle, for every pool, reads the pool's non-terminal tasks and scale
//! sets from the state store, decides how much capacity to add or remove,
//! and hands the resulting requests to the [`Provisioner`]. Nothing is kept
//! between cycles: the next cycle recomputes from whatever the store shows.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use fleetgrid_placement::{GrowthPlan, SCALESET_MAX_SIZE, ShrinkPlan, bucket_tasks, plan_growth, plan_shrink};
use fleetgrid_state::*;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::change::{Change, calculate_change};
use crate::demand::{DemandEstimator, WidestTaskDemand};
use crate::error::{AutoscaleError, AutoscaleResult};
use crate::provision::{CreateScaleset, Provisioner};

/// Service-wide autoscaler knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoscaleSettings {
    /// Instance ceiling per scale set.
    pub scaleset_max_size: u32,
    /// Region for new scale sets when the pool config names none.
    pub base_region: Option<String>,
}

impl Default for AutoscaleSettings {
    fn default() -> Self {
        Self {
            scaleset_max_size: SCALESET_MAX_SIZE,
            base_region: None,
        }
    }
}

/// Why a pool was left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Unmanaged,
    NoAutoscaleConfig,
    Unavailable { state: PoolState },
}

/// What the autoscaler decided for one pool in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Skip { reason: SkipReason },
    /// Capacity already matches. Running scale sets left empty are still
    /// removed.
    NoChange {
        change: Change,
        #[serde(skip_serializing_if = "ShrinkPlan::is_empty")]
        remove_empty: ShrinkPlan,
    },
    Grow { change: Change, plan: GrowthPlan },
    Shrink { change: Change, plan: ShrinkPlan },
}

/// Result of one pool's cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    pub pool: PoolName,
    pub decision: Decision,
    /// Provisioner calls that were accepted.
    pub requests_issued: u32,
    /// Provisioner calls that failed; re-derived next cycle.
    pub requests_failed: u32,
}

/// The autoscaler sizes every autoscaled pool from its task demand.
pub struct Autoscaler<P> {
    state: StateStore,
    estimator: Arc<dyn DemandEstimator>,
    provisioner: Arc<P>,
    settings: Arc<AutoscaleSettings>,
}

impl<P> Clone for Autoscaler<P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            estimator: self.estimator.clone(),
            provisioner: self.provisioner.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<P: Provisioner> Autoscaler<P> {
    /// Create a new autoscaler using the widest-task demand rule.
    pub fn new(state: StateStore, provisioner: Arc<P>) -> Self {
        Self {
            state,
            estimator: Arc::new(WidestTaskDemand),
            provisioner,
            settings: Arc::new(AutoscaleSettings::default()),
        }
    }

    /// Replace the demand estimator.
    pub fn with_estimator(mut self, estimator: Arc<dyn DemandEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Replace the service-wide settings.
    ///
    /// A scale set ceiling outside `1..=SCALESET_MAX_SIZE` is clamped into
    /// that range.
    pub fn with_settings(mut self, mut settings: AutoscaleSettings) -> Self {
        let ceiling = settings.scaleset_max_size.clamp(1, SCALESET_MAX_SIZE);
        if ceiling != settings.scaleset_max_size {
            warn!(
                requested = settings.scaleset_max_size,
                ceiling, "scale set ceiling out of range, clamping"
            );
            settings.scaleset_max_size = ceiling;
        }
        self.settings = Arc::new(settings);
        self
    }

    /// Decide what to do for a pool without issuing any request.
    pub fn decide(&self, pool_name: &str) -> AutoscaleResult<Decision> {
        let pool = self.load_pool(pool_name)?;
        self.decide_for(&pool)
    }

    /// Decide what to do for an already loaded pool.
    ///
    /// Skipped pools return before any task is read or demand estimated.
    pub fn decide_for(&self, pool: &Pool) -> AutoscaleResult<Decision> {
        if let Some(reason) = skip_reason(pool) {
            debug!(pool = %pool.name, ?reason, "pool not autoscaled");
            return Ok(Decision::Skip { reason });
        }

        let tasks = self.state.list_tasks(&pool.name, true)?;
        let buckets = bucket_tasks(&tasks);
        let needed = self.estimator.needed(pool, &buckets);

        let scalesets = self.state.list_scalesets(&pool.name)?;
        let change = calculate_change(pool, &scalesets, needed)?;

        let decision = match change.change_size.cmp(&0) {
            Ordering::Greater => {
                let to_add = u32::try_from(change.change_size).unwrap_or(u32::MAX);
                let plan = plan_growth(&scalesets, to_add, self.settings.scaleset_max_size);
                Decision::Grow { change, plan }
            }
            Ordering::Less => {
                let to_remove = u32::try_from(change.change_size.unsigned_abs()).unwrap_or(u32::MAX);
                let plan = plan_shrink(&scalesets, to_remove);
                Decision::Shrink { change, plan }
            }
            Ordering::Equal => Decision::NoChange {
                change,
                remove_empty: plan_shrink(&scalesets, 0),
            },
        };
        Ok(decision)
    }

    /// Run one full cycle for a pool: collect, decide, act.
    pub async fn autoscale_pool(&self, pool_name: &str) -> AutoscaleResult<CycleOutcome> {
        let pool = self.load_pool(pool_name)?;
        let decision = self.decide_for(&pool)?;

        let (requests_issued, requests_failed) = match &decision {
            Decision::Grow { plan, .. } => self.apply_growth(&pool, plan).await?,
            Decision::Shrink { plan, .. } => self.apply_shrink(&pool, plan).await,
            Decision::NoChange { remove_empty, .. } if !remove_empty.is_empty() => {
                self.apply_shrink(&pool, remove_empty).await
            }
            Decision::Skip { .. } | Decision::NoChange { .. } => (0, 0),
        };

        Ok(CycleOutcome {
            pool: pool.name,
            decision,
            requests_issued,
            requests_failed,
        })
    }

    /// Run one cycle for every pool, pools in parallel.
    ///
    /// A failing pool is logged and reported without affecting the others.
    /// Results are ordered by pool name.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from any pool's cycle, since it signals a broken
    /// planning invariant.
    pub async fn evaluate_all(&self) -> AutoscaleResult<Vec<(PoolName, AutoscaleResult<CycleOutcome>)>> {
        let pools = self.state.list_pools()?;
        let mut cycles = JoinSet::new();

        for pool in pools {
            let scaler = self.clone();
            cycles.spawn(async move {
                let result = scaler.autoscale_pool(&pool.name).await;
                (pool.name, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = cycles.join_next().await {
            match joined {
                Ok((pool, result)) => {
                    if let Err(e) = &result {
                        warn!(%pool, error = %e, "pool autoscale cycle failed");
                    }
                    results.push((pool, result));
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => error!(error = %e, "pool autoscale task cancelled"),
            }
        }

        results.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(results)
    }

    /// Run the autoscaler loop.
    ///
    /// The next cycle starts only after every pool's previous cycle has
    /// finished, so a pool never has two cycles in flight.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "autoscaler started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.evaluate_all().await {
                        error!(error = %e, "autoscaler evaluation failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn load_pool(&self, pool_name: &str) -> AutoscaleResult<Pool> {
        self.state
            .get_pool(pool_name)?
            .ok_or_else(|| AutoscaleError::PoolNotFound(pool_name.to_string()))
    }

    /// Issue resize and create requests. Returns (issued, failed).
    async fn apply_growth(&self, pool: &Pool, plan: &GrowthPlan) -> AutoscaleResult<(u32, u32)> {
        let config = pool
            .autoscale_config()
            .ok_or_else(|| AutoscaleError::NotAutoscaled(pool.name.clone()))?;

        // Resolve the region before touching anything so a misconfigured
        // pool issues no partial plan.
        let region = if plan.new_scalesets.is_empty() {
            None
        } else {
            let region = config
                .region
                .clone()
                .or_else(|| self.settings.base_region.clone())
                .ok_or_else(|| AutoscaleError::MissingRegion(pool.name.clone()))?;
            Some(region)
        };

        info!(
            pool = %pool.name,
            to_add = plan.added(),
            grow = plan.existing.len(),
            create = plan.new_scalesets.len(),
            "scale up"
        );

        let (mut issued, mut failed) = (0, 0);

        for (scaleset, new_size) in &plan.existing {
            match self.provisioner.resize(&scaleset.scaleset_id, *new_size).await {
                Ok(()) => {
                    issued += 1;
                    info!(
                        pool = %pool.name,
                        scaleset = %scaleset.scaleset_id,
                        from = scaleset.size,
                        to = new_size,
                        "scale up scaleset"
                    );
                }
                Err(e) => {
                    failed += 1;
                    warn!(
                        pool = %pool.name,
                        scaleset = %scaleset.scaleset_id,
                        error = %e,
                        "resize request failed"
                    );
                }
            }
        }

        if let Some(region) = region {
            for &size in &plan.new_scalesets {
                let request = CreateScaleset {
                    pool_name: pool.name.clone(),
                    size,
                    image: config.image.clone(),
                    vm_sku: config.vm_sku.clone(),
                    region: region.clone(),
                    spot_instances: config.spot_instances,
                    ephemeral_os_disks: config.ephemeral_os_disks,
                };
                match self.provisioner.create_scaleset(request).await {
                    Ok(scaleset_id) => {
                        issued += 1;
                        info!(pool = %pool.name, scaleset = %scaleset_id, size, "added scaleset");
                    }
                    Err(e) => {
                        failed += 1;
                        warn!(pool = %pool.name, size, error = %e, "create scaleset request failed");
                    }
                }
            }
        }

        Ok((issued, failed))
    }

    /// Issue shrink and delete requests. Returns (issued, failed).
    async fn apply_shrink(&self, pool: &Pool, plan: &ShrinkPlan) -> (u32, u32) {
        info!(
            pool = %pool.name,
            to_remove = plan.removed(),
            scalesets = plan.existing.len(),
            "scale down"
        );

        let (mut issued, mut failed) = (0, 0);
        for (scaleset, new_size) in &plan.existing {
            match self
                .provisioner
                .shrink_or_delete(&scaleset.scaleset_id, *new_size)
                .await
            {
                Ok(()) => {
                    issued += 1;
                    if *new_size == 0 {
                        info!(pool = %pool.name, scaleset = %scaleset.scaleset_id, "halting scaleset");
                    } else {
                        info!(
                            pool = %pool.name,
                            scaleset = %scaleset.scaleset_id,
                            from = scaleset.size,
                            to = new_size,
                            "scale down scaleset"
                        );
                    }
                }
                Err(e) => {
                    failed += 1;
                    warn!(
                        pool = %pool.name,
                        scaleset = %scaleset.scaleset_id,
                        error = %e,
                        "shrink request failed"
                    );
                }
            }
        }
        (issued, failed)
    }
}

fn skip_reason(pool: &Pool) -> Option<SkipReason> {
    if !pool.managed {
        return Some(SkipReason::Unmanaged);
    }
    if pool.autoscale.is_none() {
        return Some(SkipReason::NoAutoscaleConfig);
    }
    if !pool.state.is_available() {
        return Some(SkipReason::Unavailable { state: pool.state });
    }
    None
}

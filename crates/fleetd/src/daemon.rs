//! Daemon entry points shared by the `run` and `plan` subcommands.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use fleetgrid_autoscale::{Autoscaler, Provisioner};
use serde_json::{Map, Value, json};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Drive the autoscaler loop until `shutdown_signal` resolves.
///
/// If the loop dies first, most likely from a broken planning invariant,
/// the daemon stops with an error instead of idling without autoscaling.
pub async fn supervise<P, S>(
    autoscaler: Autoscaler<P>,
    interval: Duration,
    shutdown_signal: S,
) -> anyhow::Result<()>
where
    P: Provisioner,
    S: Future<Output = ()>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(async move {
        autoscaler.run(interval, shutdown_rx).await;
    });

    tokio::select! {
        joined = &mut handle => {
            return Err(match joined {
                Ok(()) => anyhow!("autoscaler loop exited unexpectedly"),
                Err(e) => {
                    error!(error = %e, "autoscaler loop died");
                    anyhow::Error::new(e).context("autoscaler loop died")
                }
            });
        }
        () = shutdown_signal => {
            info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}

/// Decide every named pool without issuing requests.
///
/// Returns one JSON entry per pool: the decision, or `{"error": ...}` when
/// that pool could not be planned. One bad pool never hides the rest.
pub fn plan_decisions<P: Provisioner>(autoscaler: &Autoscaler<P>, pools: &[String]) -> Map<String, Value> {
    let mut decisions = Map::new();
    for name in pools {
        let entry = match autoscaler.decide(name) {
            Ok(decision) => serde_json::to_value(decision).unwrap_or_else(|e| json!({ "error": e.to_string() })),
            Err(e) => {
                warn!(pool = %name, error = %e, "pool could not be planned");
                json!({ "error": e.to_string() })
            }
        };
        decisions.insert(name.clone(), entry);
    }
    decisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fleetgrid_autoscale::DemandEstimator;
    use fleetgrid_placement::Buckets;
    use fleetgrid_state::*;

    use crate::StoreProvisioner;

    struct BrokenDemand;

    impl DemandEstimator for BrokenDemand {
        fn needed(&self, _pool: &Pool, _buckets: &Buckets) -> u32 {
            panic!("demand estimation invariant broken");
        }
    }

    fn pool(name: &str, min_size: u32, max_size: Option<u32>) -> Pool {
        Pool {
            name: name.to_string(),
            pool_id: format!("{name}-id"),
            os: Os::Linux,
            arch: Architecture::X86_64,
            managed: true,
            state: PoolState::Running,
            autoscale: Some(AutoscaleConfig {
                min_size,
                max_size,
                image: "Canonical:UbuntuServer:18.04-LTS:latest".to_string(),
                vm_sku: "Standard_D2s_v3".to_string(),
                region: Some("eastus".to_string()),
                spot_instances: false,
                ephemeral_os_disks: false,
            }),
        }
    }

    fn autoscaler(state: &StateStore) -> Autoscaler<StoreProvisioner> {
        Autoscaler::new(state.clone(), Arc::new(StoreProvisioner::new(state.clone())))
    }

    #[tokio::test]
    async fn supervise_returns_after_shutdown_signal() {
        let state = StateStore::open_in_memory().unwrap();
        let result = supervise(autoscaler(&state), Duration::from_secs(3600), async {}).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn supervise_fails_when_loop_panics() {
        let state = StateStore::open_in_memory().unwrap();
        state.put_pool(&pool("linux", 0, None)).unwrap();
        let scaler = autoscaler(&state).with_estimator(Arc::new(BrokenDemand));

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            supervise(scaler, Duration::from_millis(10), std::future::pending()),
        )
        .await
        .expect("supervise should return once the loop dies");

        assert!(result.is_err());
    }

    #[test]
    fn plan_reports_failing_pool_and_continues() {
        let state = StateStore::open_in_memory().unwrap();
        state.put_pool(&pool("broken", 10, Some(3))).unwrap();
        state.put_pool(&pool("linux", 2, None)).unwrap();
        let pools = vec!["broken".to_string(), "ghost".to_string(), "linux".to_string()];

        let decisions = plan_decisions(&autoscaler(&state), &pools);

        assert_eq!(decisions.len(), 3);
        assert!(decisions["broken"]["error"].is_string());
        assert!(decisions["ghost"]["error"].is_string());
        assert_eq!(decisions["linux"]["action"], "grow");
        assert!(state.list_scalesets("linux").unwrap().is_empty());
    }
}

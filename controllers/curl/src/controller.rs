//! Main controller implementation.
//!
//! `Controller` drives the dispatch loop: every ConfigMap snapshot coming
//! off the watch is reconciled in its own task, so a slow page never holds
//! back other ConfigMaps. When the watch ends on its own the controller
//! waits `RESTART_DELAY` and opens a new one. On shutdown the watch is
//! stopped, snapshots already buffered are still dispatched, and every
//! in-flight reconcile is allowed to finish.

use crate::error::ControllerError;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::watcher::ConfigMapManager;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Delay before reopening a watch closed by the API server
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Main controller for annotated ConfigMaps.
pub struct Controller {
    manager: ConfigMapManager,
    reconciler: Arc<Reconciler>,
}

impl Controller {
    pub fn new(manager: ConfigMapManager, reconciler: Reconciler) -> Self {
        Self {
            manager,
            reconciler: Arc::new(reconciler),
        }
    }

    /// Runs the controller until `shutdown` resolves and in-flight work has
    /// drained.
    ///
    /// # Errors
    /// Returns an error if a watch cannot be opened, initially or on restart.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ControllerError> {
        info!("Starting curl controller");

        let mut snapshots = self.manager.start_watching().await?;
        let mut tasks: JoinSet<ReconcileOutcome> = JoinSet::new();
        let mut stopping = false;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown, if !stopping => {
                    info!("Shutdown requested, stopping ConfigMap watch");
                    stopping = true;
                    self.manager.stop_watching();
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    log_finished(result);
                }
                next = snapshots.recv() => match next {
                    Some(snapshot) => {
                        let reconciler = self.reconciler.clone();
                        tasks.spawn(async move { reconciler.curl_config_map(snapshot).await });
                    }
                    None if stopping => break,
                    None => {
                        warn!("ConfigMap watch closed, restarting in {:?}", RESTART_DELAY);
                        tokio::select! {
                            () = &mut shutdown => {
                                info!("Shutdown requested while restarting watch");
                                break;
                            }
                            () = tokio::time::sleep(RESTART_DELAY) => {}
                        }
                        snapshots = self.manager.start_watching().await?;
                    }
                },
            }
        }

        if !tasks.is_empty() {
            info!("Waiting for {} in-flight reconciles", tasks.len());
        }
        while let Some(result) = tasks.join_next().await {
            log_finished(result);
        }

        info!("Curl controller stopped");
        Ok(())
    }
}

fn log_finished(result: Result<ReconcileOutcome, JoinError>) {
    match result {
        Ok(outcome) => debug!("Reconcile finished: {:?}", outcome),
        Err(e) => error!("Reconcile task failed: {}", e),
    }
}

//! Process-wide registry of in-flight pipeline runs, keyed by asset id.

use mam_core::AssetStatus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::IngestError;

struct RunEntry {
    token: CancellationToken,
    finished: watch::Receiver<Option<AssetStatus>>,
    task: Option<JoinHandle<()>>,
}

/// Handed to the task executing a run; it reports the final status through it.
#[derive(Debug)]
pub struct RunTicket {
    pub token: CancellationToken,
    finished: watch::Sender<Option<AssetStatus>>,
}

impl RunTicket {
    pub fn complete(&self, status: AssetStatus) {
        self.finished.send_replace(Some(status));
    }
}

/// Holds the cancellation token and task handle of every run from submission until it
/// reaches a terminal status. At most one run per asset id is registered at a time.
///
/// Locks are never held across an await point.
#[derive(Clone, Default)]
pub struct RunRegistry {
    runs: Arc<Mutex<HashMap<Uuid, RunEntry>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, RunEntry>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, asset_id: Uuid) -> Result<RunTicket, IngestError> {
        let mut runs = self.entries();
        if runs.contains_key(&asset_id) {
            return Err(IngestError::InvalidRequest(format!(
                "a pipeline run is already active for asset {}",
                asset_id
            )));
        }

        let token = CancellationToken::new();
        let (finished_tx, finished_rx) = watch::channel(None);
        runs.insert(
            asset_id,
            RunEntry {
                token: token.clone(),
                finished: finished_rx,
                task: None,
            },
        );

        Ok(RunTicket {
            token,
            finished: finished_tx,
        })
    }

    /// Attach the task executing the run. A run that already finished has nothing to
    /// attach to; its handle is dropped.
    pub fn attach(&self, asset_id: Uuid, task: JoinHandle<()>) {
        if let Some(entry) = self.entries().get_mut(&asset_id) {
            entry.task = Some(task);
        }
    }

    pub fn finish(&self, asset_id: Uuid) {
        self.entries().remove(&asset_id);
    }

    pub fn active_runs(&self) -> Vec<Uuid> {
        self.entries().keys().copied().collect()
    }

    pub fn is_active(&self, asset_id: Uuid) -> bool {
        self.entries().contains_key(&asset_id)
    }

    /// Request cancellation of a run. Returns `false` if no run is active for the asset.
    pub fn cancel(&self, asset_id: Uuid) -> bool {
        match self.entries().get(&asset_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for the run to finish and return its final status; `None` if no run is
    /// active for the asset.
    pub async fn wait_for(&self, asset_id: Uuid) -> Option<AssetStatus> {
        let mut finished = self.entries().get(&asset_id)?.finished.clone();
        let status = finished.wait_for(|status| status.is_some()).await.ok();
        status.and_then(|status| *status)
    }

    /// Cancel every active run and wait until all of them have finished.
    pub async fn shutdown(&self) {
        let pending: Vec<(Uuid, watch::Receiver<Option<AssetStatus>>, Option<JoinHandle<()>>)> =
            self.entries()
                .iter_mut()
                .map(|(id, entry)| {
                    entry.token.cancel();
                    (*id, entry.finished.clone(), entry.task.take())
                })
                .collect();

        tracing::info!(active_runs = pending.len(), "Draining pipeline runs");

        for (asset_id, mut finished, task) in pending {
            let _ = finished.wait_for(|status| status.is_some()).await;
            if let Some(task) = task {
                if let Err(e) = task.await {
                    tracing::error!(asset.id = %asset_id, error = %e, "Pipeline task panicked");
                }
            }
        }
    }
}

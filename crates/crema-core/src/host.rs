//! Runtime host: registers workers and delivers events to the active one.
//!
//! The host owns the lifecycle. A new worker is installed while the current
//! one keeps serving; only a successful install replaces it. Every event runs
//! on its own tokio task so its work completes even if the caller stops
//! waiting, and [`WorkerHost::shutdown`] waits for all of it.
//!
//! Registrations run one at a time, in call order, so the last version
//! registered is the one left in control.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{error, info, warn};

use crate::dispatch::{Dispatcher, EventOutcome, WorkerEvent};
use crate::error::{Result, WorkerError};
use crate::lifecycle::WorkerState;
use crate::network::{retry_async, RetryConfig, RetryStats};
use crate::worker::{ActivateReport, InstallReport, OfflineWorker};

/// Outcome of registering a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReport {
    pub version: String,
    pub install: InstallReport,
    /// `None` while the worker is waiting.
    pub activate: Option<ActivateReport>,
    /// Version of the worker this one replaced.
    pub replaced: Option<String>,
    /// Windows claimed after activation.
    pub claimed: usize,
}

/// Counts event work still running.
#[derive(Debug, Default)]
pub struct WaitUntil {
    pending: AtomicUsize,
    idle: Notify,
}

impl WaitUntil {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track work until the returned guard drops.
    pub fn enter(self: &Arc<Self>) -> WaitUntilGuard {
        self.pending.fetch_add(1, Ordering::SeqCst);
        WaitUntilGuard {
            tracker: self.clone(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Resolve once no tracked work remains.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Releases one unit of tracked work on drop.
#[derive(Debug)]
pub struct WaitUntilGuard {
    tracker: Arc<WaitUntil>,
}

impl Drop for WaitUntilGuard {
    fn drop(&mut self) {
        if self.tracker.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

/// Hosts at most one active and one waiting worker.
pub struct WorkerHost {
    dispatcher: Dispatcher,
    active: RwLock<Option<Arc<OfflineWorker>>>,
    waiting: RwLock<Option<Arc<OfflineWorker>>>,
    /// Held for the whole of a registration or activation job.
    jobs: Mutex<()>,
    wait_until: Arc<WaitUntil>,
    retry: RetryConfig,
}

impl WorkerHost {
    /// A host with the standard dispatch table.
    pub fn new() -> Self {
        Self::with_dispatcher(Dispatcher::standard())
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            jobs: Mutex::new(()),
            wait_until: Arc::new(WaitUntil::new()),
            retry: RetryConfig::default(),
        }
    }

    /// Backoff used by [`register_with_retry`](Self::register_with_retry).
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn active(&self) -> Option<Arc<OfflineWorker>> {
        self.active.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<OfflineWorker>> {
        self.waiting.read().await.clone()
    }

    /// Number of events still running.
    pub fn pending_events(&self) -> usize {
        self.wait_until.pending()
    }

    /// Install `worker` and, if it skips waiting, activate it.
    ///
    /// A failed install marks the candidate redundant and leaves the current
    /// worker in control.
    pub async fn register(&self, worker: Arc<OfflineWorker>) -> Result<RegistrationReport> {
        let _job = self.jobs.lock().await;
        worker.lifecycle().transition(WorkerState::Installing)?;

        let install = match self.run(worker.clone(), WorkerEvent::Install).await {
            Ok(EventOutcome::Installed(report)) => report,
            Ok(other) => {
                worker.lifecycle().transition(WorkerState::Redundant)?;
                return Err(unexpected_outcome("install", &other));
            }
            Err(e) => {
                error!("Install of {} failed: {}", worker.version(), e);
                worker.lifecycle().transition(WorkerState::Redundant)?;
                return Err(e);
            }
        };
        worker.lifecycle().transition(WorkerState::Installed)?;

        let has_active = self.active.read().await.is_some();
        if has_active && !worker.lifecycle().skip_waiting_requested() {
            info!("Worker {} installed and waiting", worker.version());
            if let Some(previous) = self.waiting.write().await.replace(worker.clone()) {
                previous.lifecycle().transition(WorkerState::Redundant)?;
            }
            return Ok(RegistrationReport {
                version: worker.version().to_string(),
                install,
                activate: None,
                replaced: None,
                claimed: 0,
            });
        }

        self.activate(worker, install).await
    }

    /// Activate the waiting worker, if any.
    pub async fn activate_waiting(&self) -> Result<Option<RegistrationReport>> {
        let _job = self.jobs.lock().await;
        let Some(worker) = self.waiting.write().await.take() else {
            return Ok(None);
        };
        let install = InstallReport {
            version: worker.version().to_string(),
            bucket: worker.config().static_bucket(),
            cached: worker.storage().len(&worker.config().static_bucket())?,
        };
        self.activate(worker, install).await.map(Some)
    }

    async fn activate(
        &self,
        worker: Arc<OfflineWorker>,
        install: InstallReport,
    ) -> Result<RegistrationReport> {
        worker.lifecycle().transition(WorkerState::Activating)?;

        let activate = match self.run(worker.clone(), WorkerEvent::Activate).await {
            Ok(EventOutcome::Activated(report)) => report,
            Ok(other) => {
                worker.lifecycle().transition(WorkerState::Redundant)?;
                return Err(unexpected_outcome("activate", &other));
            }
            Err(e) => {
                error!("Activation of {} failed: {}", worker.version(), e);
                worker.lifecycle().transition(WorkerState::Redundant)?;
                return Err(e);
            }
        };
        worker.lifecycle().transition(WorkerState::Activated)?;

        // A version parked earlier is older than this one
        let parked = self.waiting.write().await.take();
        if let Some(parked) = parked.filter(|parked| !Arc::ptr_eq(parked, &worker)) {
            info!("Worker {} superseded waiting {}", worker.version(), parked.version());
            parked.lifecycle().transition(WorkerState::Redundant)?;
        }

        let previous = self.active.write().await.replace(worker.clone());
        let replaced = match previous {
            Some(previous) => {
                previous.lifecycle().transition(WorkerState::Redundant)?;
                info!("Worker {} replaced {}", worker.version(), previous.version());
                Some(previous.version().to_string())
            }
            None => None,
        };

        let claimed = worker.claim_clients().await?;
        info!("Worker {} activated", worker.version());

        Ok(RegistrationReport {
            version: worker.version().to_string(),
            install,
            activate: Some(activate),
            replaced,
            claimed,
        })
    }

    /// Register with exponential backoff on retryable failures.
    ///
    /// `make_worker` is called for every attempt since a failed worker is
    /// redundant and cannot be installed again.
    pub async fn register_with_retry<F>(&self, mut make_worker: F) -> (Result<RegistrationReport>, RetryStats)
    where
        F: FnMut() -> Result<OfflineWorker>,
    {
        retry_async(
            &self.retry,
            || {
                let worker = make_worker();
                async move { self.register(Arc::new(worker?)).await }
            },
            WorkerError::is_retryable,
        )
        .await
    }

    /// Deliver an event to the active worker and wait for its outcome.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        let worker = self.active().await.ok_or(WorkerError::NoActiveWorker)?;
        self.run(worker, event).await
    }

    /// Run the handler on its own task, tracked until it finishes.
    async fn run(&self, worker: Arc<OfflineWorker>, event: WorkerEvent) -> Result<EventOutcome> {
        let kind = event.kind();
        let guard = self.wait_until.enter();
        let work = self.dispatcher.dispatch(worker, event);

        let handle = tokio::spawn(async move {
            let _guard = guard;
            work.await
        });

        handle.await.map_err(|e| {
            warn!("{} handler did not complete: {}", kind, e);
            WorkerError::Other(format!("{} handler did not complete: {}", kind, e))
        })?
    }

    /// Wait for every in-flight event to finish.
    pub async fn shutdown(&self) {
        let pending = self.pending_events();
        if pending > 0 {
            info!("Waiting for {} pending event(s)", pending);
        }
        self.wait_until.wait_idle().await;
        info!("Worker host shut down");
    }
}

impl Default for WorkerHost {
    fn default() -> Self {
        Self::new()
    }
}

fn unexpected_outcome(phase: &str, outcome: &EventOutcome) -> WorkerError {
    WorkerError::Other(format!("{} handler returned {:?}", phase, outcome))
}

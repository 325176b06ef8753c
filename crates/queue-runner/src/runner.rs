use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use queue_core::{
    backoff, ArtifactSink, DiscoveryHook, FailureKind, Handler, HandlerOutcome, QueueStats,
    RunContext, RunLedger, RunStatus, RunnerConfig, StateStore, WorkItemId, WorkerHeartbeat,
    WorkerId, WorkerRegistry, WorkerStatus,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::control::ControlFlags;
use crate::metrics::{RunMetrics, SharedMetrics};
use crate::rate_limiter::RateLimiter;

/// Snapshot returned by [`ConcurrentRunner::status`]: the operator control
/// surface's read side.
#[derive(Debug, Clone)]
pub struct RunnerStatus {
    pub queue_stats: QueueStats,
    pub active_workers: Vec<WorkerHeartbeat>,
    pub current_run: Option<RunMetrics>,
    pub paused: bool,
    pub draining: bool,
    pub shutting_down: bool,
}

/// Owns a bounded worker pool and drives the claim -> execute -> persist ->
/// finalize loop for every worker. One instance is typically wrapped in an
/// `Arc` so operator signals (`pause`/`drain`/`shutdown`) can be issued from
/// a task other than the one driving `run()`.
pub struct ConcurrentRunner {
    config: RunnerConfig,
    store: Arc<dyn StateStore>,
    worker_registry: Arc<dyn WorkerRegistry>,
    ledger: Arc<dyn RunLedger>,
    artifact_sink: Arc<dyn ArtifactSink>,
    handler: Arc<dyn Handler>,
    discovery: Arc<dyn DiscoveryHook>,
    control: Arc<ControlFlags>,
    rate_limiter: Arc<RateLimiter>,
    current_metrics: Mutex<Option<Arc<SharedMetrics>>>,
    hostname: String,
    pid: u32,
}

impl ConcurrentRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RunnerConfig,
        store: Arc<dyn StateStore>,
        worker_registry: Arc<dyn WorkerRegistry>,
        ledger: Arc<dyn RunLedger>,
        artifact_sink: Arc<dyn ArtifactSink>,
        handler: Arc<dyn Handler>,
        discovery: Arc<dyn DiscoveryHook>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.requests_per_second));
        Self {
            hostname: hostname_or_unknown(),
            pid: std::process::id(),
            rate_limiter,
            control: Arc::new(ControlFlags::new()),
            config,
            store,
            worker_registry,
            ledger,
            artifact_sink,
            handler,
            discovery,
            current_metrics: Mutex::new(None),
        }
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn drain(&self) {
        self.control.drain();
    }

    pub fn shutdown(&self) {
        self.control.request_shutdown();
    }

    pub async fn status(&self) -> Result<RunnerStatus, queue_core::QueueError> {
        let queue_stats = self.store.queue_stats().await?;
        let active_workers = self.worker_registry.list_active(120).await?;
        let current_run = self
            .current_metrics
            .lock()
            .await
            .as_ref()
            .map(|m| m.snapshot("running", None));
        Ok(RunnerStatus {
            queue_stats,
            active_workers,
            current_run,
            paused: self.control.is_paused(),
            draining: self.control.is_draining(),
            shutting_down: self.control.is_shutdown(),
        })
    }

    /// Spawns `max_workers` workers, recovering expired leases first, and
    /// blocks until every worker exits (shutdown, drain, or a reached
    /// limit). Installs `Ctrl+C`/`SIGTERM` handlers for the duration of the
    /// call, aborting that listener task on exit so no signal taken during
    /// one `run()` leaks into the next, and restores the runner to a fresh
    /// control-flag state on entry, so repeated `run()` calls on the same
    /// instance never see a flag raised by a previous run.
    pub async fn run(self: Arc<Self>, run_id: Option<String>) -> RunMetrics {
        let run_id = run_id.unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        info!(run_id, max_workers = self.config.max_workers, "starting concurrent run");

        self.control.reset();
        let metrics = Arc::new(SharedMetrics::new(run_id.clone()));
        *self.current_metrics.lock().await = Some(metrics.clone());

        match self.store.recover_expired_leases().await {
            Ok(recovered) if recovered > 0 => info!(recovered, "recovered items with expired leases"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to recover expired leases at startup"),
        }

        let shutdown_on_signal = {
            let this = self.clone();
            tokio::spawn(async move {
                #[cfg(unix)]
                {
                    let mut terminate = match tokio::signal::unix::signal(
                        tokio::signal::unix::SignalKind::terminate(),
                    ) {
                        Ok(signal) => signal,
                        Err(err) => {
                            warn!(error = %err, "failed to install SIGTERM handler");
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("received interrupt signal, shutting down"),
                        _ = terminate.recv() => info!("received terminate signal, shutting down"),
                    }
                }
                #[cfg(not(unix))]
                {
                    if tokio::signal::ctrl_c().await.is_err() {
                        return;
                    }
                    info!("received interrupt signal, shutting down");
                }
                this.shutdown();
            })
        };

        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(self.config.max_workers);
        for index in 0..self.config.max_workers {
            let worker_id = WorkerId::new(format!("{}-{}-{}", self.hostname, self.pid, index));
            let this = self.clone();
            let worker_metrics = metrics.clone();
            handles.push(tokio::spawn(async move {
                this.worker_loop(worker_id, worker_metrics).await;
            }));
        }

        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "worker task panicked");
            }
        }

        shutdown_on_signal.abort();
        *self.current_metrics.lock().await = None;

        let snapshot = metrics.snapshot("completed", Some(Utc::now()));
        info!(
            processed = snapshot.items_processed,
            succeeded = snapshot.items_succeeded,
            failed = snapshot.items_failed,
            "run complete"
        );
        snapshot
    }

    async fn worker_loop(self: Arc<Self>, worker_id: WorkerId, metrics: Arc<SharedMetrics>) {
        info!(worker_id = %worker_id, "worker starting");
        let started_at = Utc::now();
        let mut processed: u64 = 0;
        let mut succeeded: u64 = 0;
        let mut failed: u64 = 0;
        let heartbeat_interval = StdDuration::from_secs(self.config.heartbeat_interval_seconds);
        let mut last_heartbeat = tokio::time::Instant::now() - heartbeat_interval;
        let mut since_last_check = self.config.batch_size;

        loop {
            if since_last_check >= self.config.batch_size {
                since_last_check = 0;

                if self.control.is_shutdown() {
                    break;
                }

                while self.control.is_paused() && !self.control.is_shutdown() {
                    self.heartbeat(&worker_id, started_at, WorkerStatus::Paused, processed, succeeded, failed, None)
                        .await;
                    tokio::time::sleep(StdDuration::from_secs(1)).await;
                }
                if self.control.is_shutdown() {
                    break;
                }

                if self.control.is_draining() {
                    info!(worker_id = %worker_id, "worker exiting (drain mode)");
                    break;
                }

                if self.reached_limit(processed, &metrics) {
                    info!(worker_id = %worker_id, "worker reached item limit, exiting");
                    break;
                }
            }
            since_last_check += 1;

            if last_heartbeat.elapsed() > heartbeat_interval {
                self.heartbeat(&worker_id, started_at, WorkerStatus::Active, processed, succeeded, failed, None)
                    .await;
                last_heartbeat = tokio::time::Instant::now();
            }

            let claim = self
                .store
                .claim_one(&worker_id, self.config.lease_seconds, self.config.source_filter.as_deref())
                .await;

            let item = match claim {
                Ok(Some(item)) => item,
                Ok(None) => {
                    self.heartbeat(&worker_id, started_at, WorkerStatus::Idle, processed, succeeded, failed, None)
                        .await;
                    tokio::time::sleep(StdDuration::from_secs(1)).await;
                    continue;
                }
                Err(err) => {
                    error!(worker_id = %worker_id, error = %err, "claim failed");
                    tokio::time::sleep(StdDuration::from_secs(1)).await;
                    continue;
                }
            };

            self.heartbeat(
                &worker_id,
                started_at,
                WorkerStatus::Active,
                processed,
                succeeded,
                failed,
                Some(item.work_item_id),
            )
            .await;

            self.rate_limiter.acquire().await;

            if self.process_item(&worker_id, &item, &metrics).await {
                succeeded += 1;
            } else {
                failed += 1;
            }
            processed += 1;
        }

        self.heartbeat(&worker_id, started_at, WorkerStatus::Stopped, processed, succeeded, failed, None)
            .await;
        if let Err(err) = self.worker_registry.remove(&worker_id).await {
            warn!(worker_id = %worker_id, error = %err, "failed to remove worker heartbeat on exit");
        }
        info!(worker_id = %worker_id, processed, "worker stopped");
    }

    fn reached_limit(&self, worker_processed: u64, metrics: &SharedMetrics) -> bool {
        if let Some(stop_after) = self.config.stop_after {
            if worker_processed >= stop_after {
                return true;
            }
        }
        if let Some(max_items) = self.config.max_items {
            if metrics.total_processed() >= max_items {
                return true;
            }
        }
        false
    }

    #[allow(clippy::too_many_arguments)]
    async fn heartbeat(
        &self,
        worker_id: &WorkerId,
        started_at: chrono::DateTime<Utc>,
        status: WorkerStatus,
        processed: u64,
        succeeded: u64,
        failed: u64,
        current_work_item_id: Option<WorkItemId>,
    ) {
        let heartbeat = WorkerHeartbeat {
            worker_id: worker_id.clone(),
            hostname: self.hostname.clone(),
            pid: self.pid,
            started_at,
            last_heartbeat_at: Utc::now(),
            items_processed: processed as i64,
            items_succeeded: succeeded as i64,
            items_failed: failed as i64,
            status,
            current_work_item_id,
        };
        if let Err(err) = self.worker_registry.upsert_heartbeat(heartbeat).await {
            warn!(worker_id = %worker_id, error = %err, "heartbeat upsert failed");
        }
    }

    /// Runs one claimed item through the handler and the outcome
    /// classification in full; returns whether the attempt succeeded.
    async fn process_item(
        &self,
        worker_id: &WorkerId,
        item: &queue_core::WorkItem,
        metrics: &SharedMetrics,
    ) -> bool {
        info!(
            worker_id = %worker_id,
            work_item_id = %item.work_item_id,
            attempt = item.attempt,
            "processing work item"
        );

        let run_id = match self
            .ledger
            .start_run(item.work_item_id, worker_id, None, None)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                error!(work_item_id = %item.work_item_id, error = %err, "failed to start run");
                metrics.record_failure(&worker_id.0);
                return false;
            }
        };

        let ctx = RunContext::new(
            self.store.clone(),
            item.work_item_id,
            worker_id.clone(),
            run_id,
            self.config.lease_seconds,
            false,
        );

        let result = self.handler.handle(item, &ctx).await;

        match result.outcome {
            HandlerOutcome::Succeeded {
                output,
                artifacts,
                domain_writes,
            } => {
                for draft in &artifacts {
                    match self
                        .artifact_sink
                        .write(run_id, &draft.artifact_type, &draft.content, &draft.mime)
                        .await
                    {
                        Ok(artifact_ref) => {
                            if let Err(err) = self
                                .ledger
                                .attach_artifact(run_id, &artifact_ref, &draft.artifact_type, &draft.mime)
                                .await
                            {
                                warn!(run_id = %run_id, error = %err, "failed to attach artifact to run");
                            }
                        }
                        Err(err) => {
                            warn!(run_id = %run_id, error = %err, "artifact write failed, treating as retryable failure");
                            let _ = self
                                .store
                                .fail(
                                    item.work_item_id,
                                    worker_id,
                                    &format!("artifact write failed: {err}"),
                                    true,
                                    None,
                                    self.config.max_retries,
                                )
                                .await;
                            let _ = self
                                .ledger
                                .finish_run(run_id, RunStatus::Failed, None, Some(&err.to_string()))
                                .await;
                            metrics.record_failure(&worker_id.0);
                            return false;
                        }
                    }
                }

                if !domain_writes.is_empty() {
                    // Domain-specific persistence is out of this crate's
                    // scope; the runner only guarantees the writes were
                    // produced before the item is marked complete.
                    tracing::debug!(count = domain_writes.len(), "handler produced domain writes");
                }

                if self.config.enable_discovery {
                    let discovered = self.discovery.discover(output.as_ref(), item).await;
                    let discovered_count = discovered.len() as u64;
                    for new_item in discovered {
                        match self.store.enqueue(new_item).await {
                            Ok(true) => {}
                            Ok(false) => {}
                            Err(err) => warn!(error = %err, "discovery enqueue failed"),
                        }
                    }
                    if discovered_count > 0 {
                        metrics.record_discovery(discovered_count);
                    }
                }

                if let Err(err) = self.store.complete(item.work_item_id, worker_id).await {
                    warn!(work_item_id = %item.work_item_id, error = %err, "complete() call failed");
                }
                let _ = self
                    .ledger
                    .finish_run(run_id, RunStatus::Succeeded, result.metrics.clone(), None)
                    .await;
                metrics.record_success(&worker_id.0);
                true
            }
            HandlerOutcome::Skipped { reason } => {
                if let Err(err) = self.store.complete(item.work_item_id, worker_id).await {
                    warn!(work_item_id = %item.work_item_id, error = %err, "complete() call failed for skipped item");
                }
                let skip_metrics = serde_json::json!({"skipped": true, "reason": reason});
                let _ = self
                    .ledger
                    .finish_run(run_id, RunStatus::Succeeded, Some(skip_metrics), None)
                    .await;
                metrics.record_success(&worker_id.0);
                true
            }
            HandlerOutcome::Failed {
                kind,
                error_message,
                retry_after_seconds,
                artifacts,
            } => {
                for draft in &artifacts {
                    if let Err(err) = self
                        .artifact_sink
                        .write(run_id, &draft.artifact_type, &draft.content, &draft.mime)
                        .await
                    {
                        warn!(run_id = %run_id, error = %err, "failed to persist artifact for failed attempt");
                    }
                }

                let retryable = kind == FailureKind::Retryable;
                let backoff_hint = retryable.then(|| {
                    backoff::retry_delay(
                        item.attempt.max(1) as u32,
                        self.config.base_backoff_seconds,
                        self.config.max_backoff_seconds,
                        retry_after_seconds.map(StdDuration::from_secs),
                        self.config.respect_retry_after,
                    )
                });
                if backoff_hint.is_some() {
                    metrics.record_backoff_event();
                    metrics.record_retry();
                }

                if let Err(err) = self
                    .store
                    .fail(
                        item.work_item_id,
                        worker_id,
                        &error_message,
                        retryable,
                        backoff_hint,
                        self.config.max_retries,
                    )
                    .await
                {
                    warn!(work_item_id = %item.work_item_id, error = %err, "fail() call failed");
                }
                let _ = self
                    .ledger
                    .finish_run(run_id, RunStatus::Failed, result.metrics.clone(), Some(&error_message))
                    .await;
                metrics.record_failure(&worker_id.0);
                false
            }
        }
    }
}

fn hostname_or_unknown() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown-host".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::{
        ArtifactDraft, HandlerResult, NewWorkItem, NoDiscovery, RunStatus as CoreRunStatus, WorkItem,
        WorkPayload,
    };
    use queue_testing::{InMemoryArtifactSink, InMemoryRunLedger, InMemoryStateStore, InMemoryWorkerRegistry};
    use serde_json::Value;

    /// A `Handler` that always returns the same scripted outcome, so a test
    /// only has to describe what it wants to happen once.
    struct ScriptedHandler(HandlerOutcome);

    #[async_trait::async_trait]
    impl Handler for ScriptedHandler {
        async fn handle(&self, _item: &WorkItem, _ctx: &RunContext) -> HandlerResult {
            HandlerResult {
                outcome: self.0.clone(),
                metrics: None,
            }
        }
    }

    /// A `DiscoveryHook` that hands back one fixed child item every call.
    struct FixedDiscovery(NewWorkItem);

    #[async_trait::async_trait]
    impl DiscoveryHook for FixedDiscovery {
        async fn discover(&self, _output: Option<&Value>, _parent: &WorkItem) -> Vec<NewWorkItem> {
            vec![self.0.clone()]
        }
    }

    fn fetch_item(resource_id: &str) -> NewWorkItem {
        NewWorkItem {
            source_system: "wiki".into(),
            source_name: "enwiki".into(),
            resource_type: "page".into(),
            resource_id: resource_id.into(),
            variant: None,
            payload: WorkPayload::Fetch {
                request_uri: format!("https://example.org/{resource_id}"),
                request_method: "GET".into(),
                request_headers: None,
                request_body: None,
            },
            priority: 0,
            run_id: None,
            discovered_from: None,
            rank: None,
        }
    }

    /// One worker, one item, exiting as soon as it is processed: enough to
    /// drive a single claim -> execute -> persist -> finalize pass without
    /// the test hanging on an empty queue.
    fn single_item_config() -> RunnerConfig {
        RunnerConfig {
            max_workers: 1,
            batch_size: 1,
            stop_after: Some(1),
            heartbeat_interval_seconds: 3600,
            ..RunnerConfig::default()
        }
    }

    #[tokio::test]
    async fn success_writes_artifact_runs_discovery_then_completes() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let worker_registry: Arc<dyn WorkerRegistry> = Arc::new(InMemoryWorkerRegistry::new());
        let ledger = Arc::new(InMemoryRunLedger::new());
        let artifact_sink: Arc<dyn ArtifactSink> = Arc::new(InMemoryArtifactSink::new());

        store.enqueue(fetch_item("parent")).await.unwrap();

        let handler = ScriptedHandler(HandlerOutcome::Succeeded {
            output: None,
            artifacts: vec![ArtifactDraft::new("output", b"hello".to_vec(), "text/plain")],
            domain_writes: Vec::new(),
        });
        let discovery = FixedDiscovery(fetch_item("child"));

        let runner = Arc::new(ConcurrentRunner::new(
            single_item_config(),
            store.clone(),
            worker_registry,
            ledger.clone(),
            artifact_sink,
            Arc::new(handler),
            Arc::new(discovery),
        ));
        let metrics = runner.run(None).await;

        assert_eq!(metrics.items_succeeded, 1);
        assert_eq!(metrics.items_discovered, 1);

        // Discovery has already enqueued the child by the time run() returns.
        assert!(store.exists("wiki:enwiki:page:child").await.unwrap());
        let stats = store.queue_stats().await.unwrap();
        assert_eq!(stats.completed, 1);

        // The artifact is attached to the run before that run is marked
        // complete, so it is already visible here.
        let runs = ledger.all_runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, CoreRunStatus::Succeeded);
        let artifacts = ledger.artifacts_for_run(runs[0].run_id).await;
        assert_eq!(artifacts.len(), 1);
    }

    #[tokio::test]
    async fn skipped_completes_item_with_skipped_run_metrics() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let worker_registry: Arc<dyn WorkerRegistry> = Arc::new(InMemoryWorkerRegistry::new());
        let ledger = Arc::new(InMemoryRunLedger::new());
        let artifact_sink: Arc<dyn ArtifactSink> = Arc::new(InMemoryArtifactSink::new());

        store.enqueue(fetch_item("already-fresh")).await.unwrap();

        let handler = ScriptedHandler(HandlerOutcome::Skipped {
            reason: "already up to date".into(),
        });

        let runner = Arc::new(ConcurrentRunner::new(
            single_item_config(),
            store.clone(),
            worker_registry,
            ledger.clone(),
            artifact_sink,
            Arc::new(handler),
            Arc::new(NoDiscovery),
        ));
        let metrics = runner.run(None).await;

        assert_eq!(metrics.items_succeeded, 1);

        // Skipping closes the run as succeeded with a `{skipped: true}`
        // marker, and the work item itself as completed, not failed.
        let stats = store.queue_stats().await.unwrap();
        assert_eq!(stats.completed, 1);

        let runs = ledger.all_runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, CoreRunStatus::Succeeded);
        let metrics_json = runs[0].metrics_json.as_ref().unwrap();
        assert_eq!(metrics_json["skipped"], Value::Bool(true));
    }

    #[tokio::test]
    async fn retryable_failure_honors_retry_after_header() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let worker_registry: Arc<dyn WorkerRegistry> = Arc::new(InMemoryWorkerRegistry::new());
        let ledger = Arc::new(InMemoryRunLedger::new());
        let artifact_sink: Arc<dyn ArtifactSink> = Arc::new(InMemoryArtifactSink::new());

        store.enqueue(fetch_item("throttled")).await.unwrap();

        let handler = ScriptedHandler(HandlerOutcome::Failed {
            kind: FailureKind::Retryable,
            error_message: "upstream returned 429".into(),
            retry_after_seconds: Some(42),
            artifacts: Vec::new(),
        });

        let runner = Arc::new(ConcurrentRunner::new(
            single_item_config(),
            store.clone(),
            worker_registry,
            ledger.clone(),
            artifact_sink,
            Arc::new(handler),
            Arc::new(NoDiscovery),
        ));
        let before = Utc::now();
        let metrics = runner.run(None).await;

        assert_eq!(metrics.items_failed, 1);

        let stats = store.queue_stats().await.unwrap();
        assert_eq!(stats.pending, 1);

        let runs = ledger.all_runs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, CoreRunStatus::Failed);

        let item = store.get(runs[0].work_item_id).await.unwrap().unwrap();
        let next_retry_at = item.next_retry_at.expect("retryable failure sets next_retry_at");
        // Retry-After is honored verbatim, not the jittered exponential
        // schedule (which could land anywhere up to 300s out).
        assert!(next_retry_at >= before + chrono::Duration::seconds(41));
        assert!(next_retry_at <= before + chrono::Duration::seconds(43));
    }
}

//! Agent two-loop scheduler.
//!
//! Poll (default 2s): collect every instrumentation source into the local
//! store and add 1 to `PollCount`. Report (default 10s): encode the whole
//! store and send it to the collector. A failed report is logged and
//! dropped; nothing is queued or retried.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tally_core::config::AgentConfig;
use tally_core::error::CoreError;
use tally_core::models::metric::MetricValue;
use tally_core::ports::monitor::InstrumentSource;
use tally_core::ports::transport::MetricsTransport;
use tally_core::protocol::SyncCodec;
use tally_core::store::MetricStore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Reserved counter bumped once per poll tick
pub const POLL_COUNT: &str = "PollCount";

/// Scheduler intervals
#[derive(Debug, Clone)]
pub struct AgentSchedulerConfig {
    /// Instrumentation poll period
    pub poll_interval: Duration,
    /// Report period
    pub report_interval: Duration,
}

impl Default for AgentSchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
        }
    }
}

impl From<&AgentConfig> for AgentSchedulerConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            report_interval: config.report_interval(),
        }
    }
}

/// Poll/report scheduler
pub struct AgentScheduler {
    config: AgentSchedulerConfig,
    store: Arc<MetricStore>,
    sources: Vec<Arc<dyn InstrumentSource>>,
    transport: Arc<dyn MetricsTransport>,
    codec: SyncCodec,
}

impl AgentScheduler {
    /// Scheduler with no sources; `PollCount` still ticks.
    pub fn new(
        config: AgentSchedulerConfig,
        store: Arc<MetricStore>,
        transport: Arc<dyn MetricsTransport>,
        codec: SyncCodec,
    ) -> Self {
        Self {
            config,
            store,
            sources: Vec::new(),
            transport,
            codec,
        }
    }

    /// Add an instrumentation source
    pub fn with_source(mut self, source: Arc<dyn InstrumentSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Agent-local store
    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    /// One poll tick. Returns how many sources succeeded.
    pub async fn poll_once(&self) -> usize {
        poll(&self.store, &self.sources).await
    }

    /// One report tick. Returns the number of records sent.
    pub async fn report_once(&self) -> Result<usize, CoreError> {
        report(&self.store, &self.codec, self.transport.as_ref()).await
    }

    /// Run both loops until `shutdown_rx` flips to `true`.
    pub async fn run(&self, shutdown_rx: watch::Receiver<bool>) {
        info!(
            "agent scheduler started: poll={}ms, report={}ms, sources={}, signing={}",
            self.config.poll_interval.as_millis(),
            self.config.report_interval.as_millis(),
            self.sources.len(),
            self.codec.is_signing()
        );

        // ============================================================
        // 1. Poll loop
        // ============================================================
        let store1 = Arc::clone(&self.store);
        let sources1 = self.sources.clone();
        let poll_period = self.config.poll_interval;
        let mut shutdown1 = shutdown_rx.clone();

        let poll_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_period);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown1.changed() => {
                        if changed.is_err() || *shutdown1.borrow() {
                            info!("poll loop stopped");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        poll(&store1, &sources1).await;
                    }
                }
            }
        });

        // ============================================================
        // 2. Report loop
        // ============================================================
        let store2 = Arc::clone(&self.store);
        let codec2 = self.codec.clone();
        let transport2 = Arc::clone(&self.transport);
        let report_period = self.config.report_interval;
        let mut shutdown2 = shutdown_rx;

        let report_task = tokio::spawn(async move {
            // first report one full period after start
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + report_period, report_period);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown2.changed() => {
                        if changed.is_err() || *shutdown2.borrow() {
                            info!("report loop stopped");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match report(&store2, &codec2, transport2.as_ref()).await {
                            Ok(sent) => debug!("report sent: {sent} records"),
                            Err(e) => warn!("report dropped: {e}"),
                        }
                    }
                }
            }
        });

        let (poll_result, report_result) = tokio::join!(poll_task, report_task);
        if let Err(e) = poll_result {
            warn!("poll task ended abnormally: {e}");
        }
        if let Err(e) = report_result {
            warn!("report task ended abnormally: {e}");
        }
        info!("agent scheduler stopped");
    }
}

async fn poll(store: &MetricStore, sources: &[Arc<dyn InstrumentSource>]) -> usize {
    let results = join_all(sources.iter().map(|s| s.collect())).await;

    let mut ok = 0;
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(batch) => match store.put_batch(&batch) {
                Ok(()) => ok += 1,
                Err(e) => warn!("source {} reading rejected: {e}", source.name()),
            },
            Err(e) => warn!("source {} failed: {e}", source.name()),
        }
    }

    if let Err(e) = store.put(POLL_COUNT, MetricValue::Counter(1)) {
        warn!("{POLL_COUNT} not incremented: {e}");
    }
    ok
}

async fn report(
    store: &MetricStore,
    codec: &SyncCodec,
    transport: &dyn MetricsTransport,
) -> Result<usize, CoreError> {
    let snapshot = store.get_all();
    if snapshot.is_empty() {
        return Ok(0);
    }
    let records = codec.encode(&snapshot)?;
    transport.send_batch(&records).await?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tally_core::models::metric::{MetricKind, Snapshot};
    use tally_core::models::record::MetricRecord;

    use super::*;

    struct FixedSource;

    #[async_trait]
    impl InstrumentSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn collect(&self) -> Result<Snapshot, CoreError> {
            Ok(Snapshot::new().with_gauge("Alloc", 3407240.0))
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl InstrumentSource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }
        async fn collect(&self) -> Result<Snapshot, CoreError> {
            Err(CoreError::Internal("sampling failed".to_string()))
        }
    }

    /// Records every batch; fails while `fail` is set
    #[derive(Default)]
    struct RecordingTransport {
        batches: Mutex<Vec<Vec<MetricRecord>>>,
        attempts: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl MetricsTransport for RecordingTransport {
        async fn send_batch(&self, records: &[MetricRecord]) -> Result<(), CoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(CoreError::Network("connection refused".to_string()));
            }
            self.batches.lock().unwrap().push(records.to_vec());
            Ok(())
        }
    }

    fn scheduler(transport: Arc<RecordingTransport>, codec: SyncCodec) -> AgentScheduler {
        AgentScheduler::new(
            AgentSchedulerConfig::default(),
            Arc::new(MetricStore::new()),
            transport,
            codec,
        )
        .with_source(Arc::new(FixedSource))
    }

    #[tokio::test]
    async fn poll_collects_sources_and_counts() {
        let sched = scheduler(Arc::default(), SyncCodec::new());
        assert_eq!(sched.poll_once().await, 1);
        sched.poll_once().await;

        let all = sched.store().get_all();
        assert_eq!(all.gauges["Alloc"], 3407240.0);
        assert_eq!(all.counters[POLL_COUNT], 2);
    }

    #[tokio::test]
    async fn failing_source_still_counts_tick() {
        let sched = scheduler(Arc::default(), SyncCodec::new()).with_source(Arc::new(BrokenSource));
        assert_eq!(sched.poll_once().await, 1);
        assert_eq!(
            sched.store().get_typed(MetricKind::Counter, POLL_COUNT).unwrap(),
            MetricValue::Counter(1)
        );
    }

    #[tokio::test]
    async fn report_sends_whole_store() {
        let transport = Arc::new(RecordingTransport::default());
        let sched = scheduler(Arc::clone(&transport), SyncCodec::new());
        sched.poll_once().await;

        assert_eq!(sched.report_once().await.unwrap(), 2);
        let batches = transport.batches.lock().unwrap();
        assert_eq!(
            batches[0],
            vec![
                MetricRecord::gauge("Alloc", 3407240.0),
                MetricRecord::counter(POLL_COUNT, 1),
            ]
        );
    }

    #[tokio::test]
    async fn empty_store_sends_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let sched = scheduler(Arc::clone(&transport), SyncCodec::new());
        assert_eq!(sched.report_once().await.unwrap(), 0);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn signed_reports_carry_hashes() {
        let transport = Arc::new(RecordingTransport::default());
        let sched = scheduler(Arc::clone(&transport), SyncCodec::from_secret(Some("secret")));
        sched.poll_once().await;
        sched.report_once().await.unwrap();

        let batches = transport.batches.lock().unwrap();
        assert!(batches[0].iter().all(|r| r.hash.is_some()));
    }

    #[tokio::test]
    async fn dropped_report_folds_into_next() {
        let transport = Arc::new(RecordingTransport::default());
        let sched = scheduler(Arc::clone(&transport), SyncCodec::new());

        transport.fail.store(true, Ordering::SeqCst);
        sched.poll_once().await;
        assert!(sched.report_once().await.is_err());

        transport.fail.store(false, Ordering::SeqCst);
        sched.poll_once().await;
        sched.report_once().await.unwrap();

        let batches = transport.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].contains(&MetricRecord::counter(POLL_COUNT, 2)));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let transport = Arc::new(RecordingTransport::default());
        let sched = Arc::new(
            AgentScheduler::new(
                AgentSchedulerConfig {
                    poll_interval: Duration::from_millis(10),
                    report_interval: Duration::from_millis(30),
                },
                Arc::new(MetricStore::new()),
                Arc::clone(&transport) as Arc<dyn MetricsTransport>,
                SyncCodec::new(),
            )
            .with_source(Arc::new(FixedSource)),
        );

        let (tx, rx) = watch::channel(false);
        let runner = Arc::clone(&sched);
        let handle = tokio::spawn(async move { runner.run(rx).await });

        tokio::time::sleep(Duration::from_millis(150)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(!transport.batches.lock().unwrap().is_empty());
        let polls = sched
            .store()
            .get_typed(MetricKind::Counter, POLL_COUNT)
            .unwrap();
        let sent_after_stop = transport.attempts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(transport.attempts.load(Ordering::SeqCst), sent_after_stop);
        assert_eq!(
            sched.store().get_typed(MetricKind::Counter, POLL_COUNT).unwrap(),
            polls
        );
    }
}

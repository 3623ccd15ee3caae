//! Periodic collection: one independent task per metric kind.
//!
//! `start` runs every collector once and waits for all of them before arming
//! the periodic tasks. `stop` prevents new ticks and waits for in-flight ones.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::broadcast::Broadcaster;
use crate::domain::MetricKind;
use crate::ports::{CollectError, Collector, MetricStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler cannot start while {0:?}")]
    NotStopped(SchedulerState),
}

/// A collector and the period it runs at
#[derive(Clone)]
pub struct ScheduledTask {
    kind: MetricKind,
    period: Duration,
    collector: Arc<dyn Collector>,
}

impl ScheduledTask {
    pub fn new(collector: Arc<dyn Collector>, period: Duration) -> Self {
        Self {
            kind: collector.kind(),
            period,
            collector,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Outcome of the initial collection barrier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub total: usize,
    pub failed: Vec<MetricKind>,
}

/// Everything a tick needs, cheap to clone into each task
#[derive(Clone)]
struct TickContext {
    store: Arc<dyn MetricStore>,
    broadcaster: Broadcaster,
    collect_timeout: Option<Duration>,
}

impl TickContext {
    /// collect -> store -> broadcast. A failed collection writes nothing.
    async fn tick(&self, task: &ScheduledTask) -> Result<(), CollectError> {
        let update = match self.collect_timeout {
            Some(limit) => time::timeout(limit, task.collector.collect())
                .await
                .map_err(|_| CollectError::TimedOut(limit))??,
            None => task.collector.collect().await?,
        };

        let message = self.store.record(update);
        let delivered = self.broadcaster.broadcast(&message);
        debug!(kind = %task.kind, subscribers = delivered, "Metric updated");

        Ok(())
    }

    async fn tick_logged(&self, task: &ScheduledTask) -> bool {
        match self.tick(task).await {
            Ok(()) => true,
            Err(e) => {
                warn!(kind = %task.kind, error = %e, "Collection failed");
                false
            }
        }
    }
}

struct RunningTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    context: TickContext,
    state: Mutex<SchedulerState>,
    running: Mutex<Option<RunningTasks>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn MetricStore>, broadcaster: Broadcaster) -> Self {
        Self {
            tasks: Vec::new(),
            context: TickContext {
                store,
                broadcaster,
                collect_timeout: None,
            },
            state: Mutex::new(SchedulerState::Stopped),
            running: Mutex::new(None),
        }
    }

    pub fn with_task(mut self, task: ScheduledTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// Bound every collection call. `None` lets a collector run as long as it needs.
    pub fn with_collect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.context.collect_timeout = timeout;
        self
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Collect every kind once, then start the periodic tasks.
    ///
    /// Failing collectors are logged and reported, never fatal.
    pub async fn start(&self) -> Result<StartupReport, SchedulerError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != SchedulerState::Stopped {
                return Err(SchedulerError::NotStopped(*state));
            }
            *state = SchedulerState::Starting;
        }

        info!(tasks = self.tasks.len(), "Running initial collection");
        let report = self.collect_all().await;
        info!(total = report.total, failed = report.failed.len(), "Initial collection complete");

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != SchedulerState::Starting {
            // stop() arrived during the initial collection
            *state = SchedulerState::Stopped;
            info!("Scheduler stopped before periodic tasks were armed");
            return Ok(report);
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handles = self
            .tasks
            .iter()
            .cloned()
            .map(|task| tokio::spawn(run_periodic(task, self.context.clone(), shutdown_rx.clone())))
            .collect();

        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(RunningTasks { shutdown, handles });
        *state = SchedulerState::Running;
        drop(state);
        info!(task_count = self.tasks.len(), "Scheduler started");

        Ok(report)
    }

    async fn collect_all(&self) -> StartupReport {
        // Spawned so blocking collectors still run in parallel
        let handles: Vec<(MetricKind, JoinHandle<bool>)> = self
            .tasks
            .iter()
            .cloned()
            .map(|task| {
                let context = self.context.clone();
                let kind = task.kind;
                (kind, tokio::spawn(async move { context.tick_logged(&task).await }))
            })
            .collect();

        let (kinds, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let failed = kinds
            .into_iter()
            .zip(results)
            .filter_map(|(kind, result)| match result {
                Ok(true) => None,
                Ok(false) => Some(kind),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Collector panicked");
                    Some(kind)
                }
            })
            .collect();

        StartupReport {
            total: self.tasks.len(),
            failed,
        }
    }

    /// Cancel all future ticks and wait for in-flight ones to finish.
    ///
    /// During `start` this only marks the scheduler as stopping: the initial
    /// collection completes and no periodic task is armed. Does nothing when
    /// already stopped or stopping.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                SchedulerState::Running => *state = SchedulerState::Stopping,
                SchedulerState::Starting => {
                    *state = SchedulerState::Stopping;
                    info!("Stop requested during initial collection");
                    return;
                }
                SchedulerState::Stopping | SchedulerState::Stopped => return,
            }
        }

        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(running) = running {
            let _ = running.shutdown.send(true);
            for handle in running.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Collection task ended abnormally");
                }
            }
        }

        self.set_state(SchedulerState::Stopped);
        info!("Scheduler stopped");
    }
}

async fn run_periodic(task: ScheduledTask, context: TickContext, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = time::interval_at(Instant::now() + task.period, task.period);
    // A slow tick pushes the next one back instead of queueing a burst
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        if *shutdown.borrow() {
            break;
        }

        // Not raced against shutdown: an in-flight collection always completes
        context.tick_logged(&task).await;
    }

    debug!(kind = %task.kind, "Collection task stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::adapters::store::InMemoryMetricsRepository;
    use crate::domain::{CpuMetrics, MemoryMetrics, MetricUpdate};

    struct FakeCollector {
        kind: MetricKind,
        delay: Duration,
        fail: bool,
        started: AtomicUsize,
        completed: AtomicUsize,
    }

    impl FakeCollector {
        fn ok(kind: MetricKind) -> Arc<Self> {
            Self::build(kind, Duration::ZERO, false)
        }

        fn failing(kind: MetricKind) -> Arc<Self> {
            Self::build(kind, Duration::ZERO, true)
        }

        fn slow(kind: MetricKind, delay: Duration) -> Arc<Self> {
            Self::build(kind, delay, false)
        }

        fn build(kind: MetricKind, delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                delay,
                fail,
                started: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
            })
        }

        fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Collector for FakeCollector {
        fn kind(&self) -> MetricKind {
            self.kind
        }

        async fn collect(&self) -> Result<MetricUpdate, CollectError> {
            let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                time::sleep(self.delay).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                return Err(CollectError::Command {
                    command: "fake".to_string(),
                    reason: "always fails".to_string(),
                });
            }

            Ok(match self.kind {
                MetricKind::Cpu => MetricUpdate::Cpu(CpuMetrics::new(n as f64, 4, 2, "Fake", 1.0)),
                MetricKind::Memory => MetricUpdate::Memory(MemoryMetrics::from_bytes(n as u64, 100, 0)),
                MetricKind::Docker => MetricUpdate::Docker(vec![]),
                MetricKind::Ports => MetricUpdate::Ports(vec![]),
                MetricKind::Storage => MetricUpdate::Storage(vec![]),
                MetricKind::Services => MetricUpdate::Services(vec![]),
                other => panic!("fake collector does not produce {}", other),
            })
        }
    }

    fn setup() -> (Arc<InMemoryMetricsRepository>, Broadcaster) {
        (Arc::new(InMemoryMetricsRepository::new(60)), Broadcaster::new())
    }

    fn task(collector: &Arc<FakeCollector>, period_ms: u64) -> ScheduledTask {
        ScheduledTask::new(collector.clone(), Duration::from_millis(period_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_completes_despite_failing_collector() {
        let (store, broadcaster) = setup();
        let cpu = FakeCollector::ok(MetricKind::Cpu);
        let memory = FakeCollector::ok(MetricKind::Memory);
        let docker = FakeCollector::failing(MetricKind::Docker);

        let scheduler = Scheduler::new(store.clone(), broadcaster)
            .with_task(task(&cpu, 1000))
            .with_task(task(&memory, 1000))
            .with_task(task(&docker, 1000));

        let report = scheduler.start().await.unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.failed, vec![MetricKind::Docker]);
        assert!(store.cpu().is_some());
        assert!(store.memory().is_some());
        assert!(store.docker().is_none());
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_follow_period_and_stop_halts_them() {
        let (store, broadcaster) = setup();
        let cpu = FakeCollector::ok(MetricKind::Cpu);
        let scheduler = Scheduler::new(store.clone(), broadcaster).with_task(task(&cpu, 1000));

        scheduler.start().await.unwrap();
        assert_eq!(cpu.completed(), 1);

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(cpu.completed(), 4);
        assert_eq!(store.cpu_history().len(), 4);

        scheduler.stop().await;
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(cpu.completed(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let (store, broadcaster) = setup();
        let cpu = FakeCollector::ok(MetricKind::Cpu);
        let scheduler = Scheduler::new(store, broadcaster).with_task(task(&cpu, 1000));

        scheduler.start().await.unwrap();
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::NotStopped(SchedulerState::Running))
        ));
        scheduler.stop().await;

        // Restartable once stopped
        scheduler.start().await.unwrap();
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_collection() {
        let (store, broadcaster) = setup();
        let cpu = FakeCollector::slow(MetricKind::Cpu, Duration::from_secs(10));
        let scheduler = Scheduler::new(store.clone(), broadcaster).with_task(task(&cpu, 1000));

        scheduler.start().await.unwrap();
        assert_eq!(cpu.completed(), 1);

        // Second tick begins at +1s and is still collecting
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(cpu.started(), 2);
        assert_eq!(cpu.completed(), 1);

        scheduler.stop().await;
        assert_eq!(cpu.completed(), 2);
        assert_eq!(store.cpu_history().len(), 2);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_startup_arms_no_periodic_tasks() {
        let (store, broadcaster) = setup();
        let cpu = FakeCollector::slow(MetricKind::Cpu, Duration::from_secs(5));
        let scheduler = Arc::new(Scheduler::new(store.clone(), broadcaster).with_task(task(&cpu, 1000)));

        let starting = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.start().await }
        });

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(scheduler.state(), SchedulerState::Starting);
        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopping);

        let report = starting.await.unwrap().unwrap();
        assert!(report.failed.is_empty());
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(store.cpu().is_some());

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(cpu.started(), 1);

        // Still restartable
        scheduler.start().await.unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_kind_does_not_delay_other_kinds() {
        let (store, broadcaster) = setup();
        let slow = FakeCollector::slow(MetricKind::Memory, Duration::from_secs(5));
        let fast = FakeCollector::ok(MetricKind::Cpu);
        let scheduler = Scheduler::new(store, broadcaster)
            .with_task(task(&slow, 1000))
            .with_task(task(&fast, 1000));

        scheduler.start().await.unwrap();
        time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(fast.completed(), 4);
        // The slow kind never overlaps itself
        assert_eq!(slow.started(), 2);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_kind_keeps_stale_value_and_others_advance() {
        let (store, broadcaster) = setup();
        let cpu = FakeCollector::ok(MetricKind::Cpu);
        let ports = FakeCollector::failing(MetricKind::Ports);
        let scheduler = Scheduler::new(store.clone(), broadcaster)
            .with_task(task(&cpu, 1000))
            .with_task(task(&ports, 1000));

        scheduler.start().await.unwrap();
        time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(ports.completed(), 3);
        assert!(store.ports().is_none());
        assert_eq!(store.cpu_history().len(), 3);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_timeout_counts_as_failure() {
        let (store, broadcaster) = setup();
        let cpu = FakeCollector::slow(MetricKind::Cpu, Duration::from_secs(30));
        let scheduler = Scheduler::new(store.clone(), broadcaster)
            .with_task(task(&cpu, 60_000))
            .with_collect_timeout(Some(Duration::from_secs(1)));

        let report = scheduler.start().await.unwrap();
        assert_eq!(report.failed, vec![MetricKind::Cpu]);
        assert!(store.cpu().is_none());

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_broadcast_to_subscribers() {
        let (store, broadcaster) = setup();
        let (_subscription, mut rx) = broadcaster.subscribe("127.0.0.1");
        let cpu = FakeCollector::ok(MetricKind::Cpu);
        let scheduler = Scheduler::new(store, broadcaster).with_task(task(&cpu, 1000));

        scheduler.start().await.unwrap();

        let frame = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "cpu");
        assert_eq!(value["payload"]["history"].as_array().unwrap().len(), 1);

        scheduler.stop().await;
    }
}

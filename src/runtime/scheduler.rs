/// Background polling scheduler
///
/// Runs the two evaluation loops: a short-cadence loop for timer Areas and
/// a longer-cadence loop for service-backed Areas. Each loop wakes on a
/// fixed interval, loads its batch, and evaluates every Area in isolation:
/// one Area's failure never affects another, and a slow tick is skipped
/// rather than stacked behind the previous one.
///
/// De-duplication contract: the "last checked" bound is advanced to the
/// poll start time before the reaction is dispatched, so a crash between
/// advance and dispatch loses at most one delivery and never duplicates
/// one.

use crate::area::store::{AreaStore, ExecutionStatus};
use crate::area::types::Area;
use crate::config::PollingConfig;
use crate::error::EngineError;
use crate::integration::timer::build_timer_event;
use crate::integration::{ConnectionManager, ServiceRegistry};
use crate::runtime::dispatcher::ReactionDispatcher;
use crate::runtime::resolver;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Outcome counters for one polling tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// Areas whose trigger fired and whose reaction completed
    pub succeeded: u64,
    /// Areas whose evaluation or reaction failed
    pub failed: u64,
    /// Areas skipped by the circuit breaker
    pub skipped: u64,
}

impl TickStats {
    fn record(&mut self, outcome: EvalOutcome) {
        match outcome {
            EvalOutcome::Fired => self.succeeded += 1,
            EvalOutcome::Quiet => {}
            EvalOutcome::Failed => self.failed += 1,
            EvalOutcome::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum EvalOutcome {
    /// Trigger fired and the reaction ran
    Fired,
    /// Trigger condition did not hold
    Quiet,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy)]
enum LoopKind {
    Timer,
    Service,
}

impl LoopKind {
    fn name(self) -> &'static str {
        match self {
            LoopKind::Timer => "timer",
            LoopKind::Service => "service",
        }
    }
}

/// The two polling loops plus single-Area evaluation logic
pub struct PollingScheduler {
    evaluator: Arc<AreaEvaluator>,
    polling: PollingConfig,
    /// Bounds concurrent service-trigger evaluations per tick
    semaphore: Arc<Semaphore>,
    /// At most one timer poll at a time, whether background or manual
    timer_gate: Mutex<()>,
    /// At most one service poll at a time, whether background or manual
    service_gate: Mutex<()>,
    shutdown: watch::Sender<bool>,
}

impl PollingScheduler {
    pub fn new(
        areas: AreaStore,
        registry: Arc<ServiceRegistry>,
        connections: Arc<ConnectionManager>,
        dispatcher: Arc<ReactionDispatcher>,
        polling: PollingConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(polling.max_concurrency.max(1)));
        let (shutdown, _) = watch::channel(false);
        let evaluator = Arc::new(AreaEvaluator {
            areas,
            registry,
            connections,
            dispatcher,
            polling: polling.clone(),
        });
        Self {
            evaluator,
            polling,
            semaphore,
            timer_gate: Mutex::new(()),
            service_gate: Mutex::new(()),
            shutdown,
        }
    }

    /// Spawn both polling loops. Returns immediately; the loops run until
    /// `stop` is called.
    pub fn start(self: &Arc<Self>) {
        tracing::info!(
            "Starting polling scheduler (timer every {}s, services every {}s, concurrency {})",
            self.polling.timer_interval_secs,
            self.polling.service_interval_secs,
            self.polling.max_concurrency
        );
        tokio::spawn(Arc::clone(self).run_loop(LoopKind::Timer));
        tokio::spawn(Arc::clone(self).run_loop(LoopKind::Service));
    }

    /// Signal both loops to exit after their current tick.
    pub fn stop(&self) {
        tracing::info!("Stopping polling scheduler");
        let _ = self.shutdown.send(true);
    }

    async fn run_loop(self: Arc<Self>, kind: LoopKind) {
        let cadence = Duration::from_secs(match kind {
            LoopKind::Timer => self.polling.timer_interval_secs,
            LoopKind::Service => self.polling.service_interval_secs,
        });
        let mut interval = tokio::time::interval(cadence);
        // Skip, never burst: if a tick overruns its cadence the missed
        // wakeups are dropped.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.subscribe();
        let deadline = Duration::from_secs(self.polling.tick_deadline_secs);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {
                    tracing::info!("{} polling loop stopped", kind.name());
                    return;
                }
            }

            let started = Instant::now();
            let tick = async {
                match kind {
                    LoopKind::Timer => self.poll_timer_areas_once().await,
                    LoopKind::Service => self.poll_service_areas_once().await,
                }
            };
            match tokio::time::timeout(deadline, tick).await {
                Ok(Ok(stats)) => {
                    if stats.succeeded > 0 || stats.failed > 0 || stats.skipped > 0 {
                        tracing::info!(
                            "{} tick finished in {:?}: {} fired, {} failed, {} skipped",
                            kind.name(),
                            started.elapsed(),
                            stats.succeeded,
                            stats.failed,
                            stats.skipped
                        );
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!("{} tick failed: {}", kind.name(), e);
                }
                Err(_) => {
                    tracing::warn!(
                        "{} tick exceeded its {:?} deadline, abandoning it",
                        kind.name(),
                        deadline
                    );
                }
            }
        }
    }

    /// Evaluate every active timer Area once.
    ///
    /// Timer triggers are in-process clock comparisons, so the batch runs
    /// sequentially; only the reactions touch the network.
    ///
    /// Returns empty stats without evaluating anything when a timer poll
    /// is already running, so a manual poll cannot race the background
    /// loop on the same Areas.
    pub async fn poll_timer_areas_once(&self) -> Result<TickStats, EngineError> {
        let Ok(_gate) = self.timer_gate.try_lock() else {
            tracing::debug!("Timer poll already in progress, skipping");
            return Ok(TickStats::default());
        };
        let batch = self.evaluator.areas.find_active_timer_areas().await?;
        tracing::debug!("Timer poll: {} active areas", batch.len());

        let mut stats = TickStats::default();
        for area in batch {
            stats.record(self.evaluator.evaluate_timer_area(&area).await);
        }
        Ok(stats)
    }

    /// Evaluate every active service-backed Area once, with bounded
    /// concurrency.
    ///
    /// Returns empty stats without evaluating anything when a service poll
    /// is already running; overlapping polls would both read the same
    /// "last checked" bound and deliver the same event twice.
    pub async fn poll_service_areas_once(&self) -> Result<TickStats, EngineError> {
        let Ok(_gate) = self.service_gate.try_lock() else {
            tracing::debug!("Service poll already in progress, skipping");
            return Ok(TickStats::default());
        };
        let batch = self.evaluator.areas.find_active_service_areas().await?;
        tracing::debug!("Service poll: {} active areas", batch.len());
        let poll_start = Utc::now();

        let mut tasks: JoinSet<EvalOutcome> = JoinSet::new();
        for area in batch {
            let semaphore = Arc::clone(&self.semaphore);
            let evaluator = Arc::clone(&self.evaluator);
            tasks.spawn(async move {
                // The semaphore is never closed, so acquire cannot fail.
                let Ok(_permit) = semaphore.acquire().await else {
                    return EvalOutcome::Skipped;
                };
                evaluator.evaluate_service_area(&area, poll_start).await
            });
        }

        let mut stats = TickStats::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    tracing::error!("Area evaluation task panicked: {}", e);
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }
}

/// Per-Area evaluation logic, shared by both loops and their spawned tasks
struct AreaEvaluator {
    areas: AreaStore,
    registry: Arc<ServiceRegistry>,
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<ReactionDispatcher>,
    polling: PollingConfig,
}

impl AreaEvaluator {
    async fn evaluate_timer_area(&self, area: &Area) -> EvalOutcome {
        if self.circuit_open(area) {
            self.log_skip(area).await;
            return EvalOutcome::Skipped;
        }
        let Some(timer_config) = &area.timer_config else {
            return EvalOutcome::Quiet;
        };

        let now = Utc::now();
        if !timer_config.is_due(now, area.last_fired_at) {
            return EvalOutcome::Quiet;
        }

        let started = Instant::now();

        // Advance the fire bookmark first so a crash mid-dispatch cannot
        // re-fire this boundary.
        if let Err(e) = self.areas.update_after_fire(area.id, now).await {
            tracing::error!("Failed to advance fire time for area {}: {}", area.id, e);
            return EvalOutcome::Failed;
        }

        let event = build_timer_event(timer_config, now);
        match self.dispatcher.dispatch(area, &event).await {
            Ok(()) => {
                tracing::info!("Area {} fired: {}", area.id, event.summary);
                self.log_outcome(area.id, ExecutionStatus::Success, &event.summary, started)
                    .await;
                EvalOutcome::Fired
            }
            Err(e) => {
                self.handle_failure(area, &e).await;
                self.log_outcome(area.id, ExecutionStatus::Failure, &e.to_string(), started)
                    .await;
                EvalOutcome::Failed
            }
        }
    }

    async fn evaluate_service_area(&self, area: &Area, poll_start: DateTime<Utc>) -> EvalOutcome {
        if self.circuit_open(area) {
            self.log_skip(area).await;
            return EvalOutcome::Skipped;
        }

        let started = Instant::now();
        match self.check_and_dispatch(area, poll_start).await {
            Ok(Some(summary)) => {
                tracing::info!("Area {} fired: {}", area.id, summary);
                self.log_outcome(area.id, ExecutionStatus::Success, &summary, started)
                    .await;
                EvalOutcome::Fired
            }
            Ok(None) => EvalOutcome::Quiet,
            Err(e) => {
                self.handle_failure(area, &e).await;
                self.log_outcome(area.id, ExecutionStatus::Failure, &e.to_string(), started)
                    .await;
                EvalOutcome::Failed
            }
        }
    }

    /// Run the trigger check and, when it fires, the reaction.
    ///
    /// Returns the event summary when the Area fired.
    async fn check_and_dispatch(
        &self,
        area: &Area,
        poll_start: DateTime<Utc>,
    ) -> Result<Option<String>, EngineError> {
        let action = resolver::resolve_action(area)?;
        let service_id = area.action_service().to_string();
        let integration = self.registry.lookup(&service_id)?;

        let token = match area.action_connection_id {
            Some(connection_id) if integration.requires_oauth() => {
                let oauth = integration.oauth_config().ok_or_else(|| {
                    EngineError::IntegrationCall(format!(
                        "service '{service_id}' requires OAuth but has no OAuth configuration"
                    ))
                })?;
                Some(
                    self.connections
                        .valid_access_token(connection_id, &oauth)
                        .await?,
                )
            }
            _ => None,
        };

        // No prior bookmark: bound "new" at this poll so historical events
        // do not replay on the first tick.
        let since = area.last_checked_at.unwrap_or(poll_start);
        let call_timeout = Duration::from_secs(self.polling.call_timeout_secs);

        let event = tokio::time::timeout(
            call_timeout,
            integration.check_trigger(&action, token.as_deref(), since),
        )
        .await
        .map_err(|_| {
            EngineError::IntegrationCall(format!(
                "trigger check for area {} timed out after {:?}",
                area.id, call_timeout
            ))
        })??;

        let Some(event) = event else {
            self.areas.update_last_checked(area.id, poll_start).await?;
            self.areas.reset_failures(area.id).await?;
            return Ok(None);
        };

        // At-most-once: advance the bookmark before dispatching, accepting
        // a lost delivery over a duplicated one if we crash in between.
        self.areas.update_last_checked(area.id, poll_start).await?;
        self.dispatcher.dispatch(area, &event).await?;
        self.areas.update_after_fire(area.id, poll_start).await?;
        Ok(Some(event.summary))
    }

    fn circuit_open(&self, area: &Area) -> bool {
        if area.consecutive_failures >= self.polling.max_consecutive_failures {
            tracing::warn!(
                "Skipping area {} after {} consecutive failures",
                area.id,
                area.consecutive_failures
            );
            return true;
        }
        false
    }

    /// Record a circuit-breaker skip in the execution log.
    async fn log_skip(&self, area: &Area) {
        let message = format!(
            "skipped after {} consecutive failures",
            area.consecutive_failures
        );
        self.log_outcome(area.id, ExecutionStatus::Skipped, &message, Instant::now())
            .await;
    }

    async fn handle_failure(&self, area: &Area, error: &EngineError) {
        tracing::error!("Area {} evaluation failed: {}", area.id, error);
        if error.requires_reauthorization() {
            tracing::warn!(
                "Deactivating area {} until its connection is reauthorized",
                area.id
            );
            if let Err(e) = self.areas.set_active(area.id, false).await {
                tracing::error!("Failed to deactivate area {}: {}", area.id, e);
            }
            return;
        }
        if let Err(e) = self.areas.record_failure(area.id).await {
            tracing::error!("Failed to record failure for area {}: {}", area.id, e);
        }
    }

    async fn log_outcome(
        &self,
        area_id: i64,
        status: ExecutionStatus,
        message: &str,
        started: Instant,
    ) {
        let duration_ms = started.elapsed().as_millis() as i64;
        if let Err(e) = self
            .areas
            .log_execution(area_id, status, Some(message), duration_ms)
            .await
        {
            tracing::warn!("Failed to write execution log for area {}: {}", area_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::config::{ActionKind, ReactionKind};
    use crate::area::store::{ConnectionStore, NewArea};
    use crate::area::types::{TimerActionConfig, TriggerConfig, WorkflowData};
    use crate::integration::schema::{ActionDefinition, ReactionDefinition};
    use crate::integration::{ReactionCredential, ServiceIntegration, TriggerEvent};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Trigger-side fake: fires or fails on command
    struct FakeSource {
        id: &'static str,
        fires: bool,
        error: Option<fn() -> EngineError>,
    }

    #[async_trait]
    impl ServiceIntegration for FakeSource {
        fn service_id(&self) -> &'static str {
            self.id
        }
        fn service_name(&self) -> &'static str {
            "Fake Source"
        }
        fn service_description(&self) -> &'static str {
            "test trigger source"
        }
        fn actions(&self) -> Vec<ActionDefinition> {
            Vec::new()
        }
        fn reactions(&self) -> Vec<ReactionDefinition> {
            Vec::new()
        }
        fn requires_oauth(&self) -> bool {
            false
        }
        async fn check_trigger(
            &self,
            _action: &ActionKind,
            _access_token: Option<&str>,
            _since: DateTime<Utc>,
        ) -> Result<Option<TriggerEvent>, EngineError> {
            if let Some(make_error) = self.error {
                return Err(make_error());
            }
            if self.fires {
                Ok(Some(TriggerEvent::new("fake event", Utc::now())))
            } else {
                Ok(None)
            }
        }
    }

    /// Trigger-side fake: fires only for polls whose lower bound predates
    /// a single fixed event
    struct OneEventSource {
        event_at: DateTime<Utc>,
    }

    #[async_trait]
    impl ServiceIntegration for OneEventSource {
        fn service_id(&self) -> &'static str {
            "oneshot"
        }
        fn service_name(&self) -> &'static str {
            "One Event Source"
        }
        fn service_description(&self) -> &'static str {
            "test trigger source with one event"
        }
        fn actions(&self) -> Vec<ActionDefinition> {
            Vec::new()
        }
        fn reactions(&self) -> Vec<ReactionDefinition> {
            Vec::new()
        }
        fn requires_oauth(&self) -> bool {
            false
        }
        async fn check_trigger(
            &self,
            _action: &ActionKind,
            _access_token: Option<&str>,
            since: DateTime<Utc>,
        ) -> Result<Option<TriggerEvent>, EngineError> {
            if since < self.event_at {
                Ok(Some(TriggerEvent::new("one event", self.event_at)))
            } else {
                Ok(None)
            }
        }
    }

    /// Reaction-side fake: counts deliveries
    struct FakeSink {
        deliveries: AtomicUsize,
    }

    #[async_trait]
    impl ServiceIntegration for FakeSink {
        fn service_id(&self) -> &'static str {
            "sink"
        }
        fn service_name(&self) -> &'static str {
            "Fake Sink"
        }
        fn service_description(&self) -> &'static str {
            "test reaction sink"
        }
        fn actions(&self) -> Vec<ActionDefinition> {
            Vec::new()
        }
        fn reactions(&self) -> Vec<ReactionDefinition> {
            Vec::new()
        }
        fn requires_oauth(&self) -> bool {
            false
        }
        async fn execute_reaction(
            &self,
            _reaction: &ReactionKind,
            _credential: &ReactionCredential,
            _event: &TriggerEvent,
        ) -> Result<(), EngineError> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        scheduler: PollingScheduler,
        areas: AreaStore,
        sink: Arc<FakeSink>,
    }

    async fn harness(sources: Vec<Arc<dyn ServiceIntegration>>) -> Harness {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let areas = AreaStore::new(pool.clone());
        areas.init_schema().await.unwrap();
        let connections = ConnectionStore::new(pool);
        connections.init_schema().await.unwrap();

        let sink = Arc::new(FakeSink {
            deliveries: AtomicUsize::new(0),
        });
        let mut registry = ServiceRegistry::new();
        registry
            .register(Arc::clone(&sink) as Arc<dyn ServiceIntegration>)
            .unwrap();
        for source in sources {
            registry.register(source).unwrap();
        }
        let registry = Arc::new(registry);

        let manager = Arc::new(ConnectionManager::new(
            connections,
            reqwest::Client::new(),
            chrono::Duration::seconds(60),
        ));
        let dispatcher = Arc::new(ReactionDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&manager),
            Duration::from_secs(5),
        ));
        let polling = PollingConfig {
            timer_interval_secs: 1,
            service_interval_secs: 1,
            max_concurrency: 2,
            call_timeout_secs: 5,
            tick_deadline_secs: 30,
            refresh_skew_secs: 60,
            max_consecutive_failures: 5,
        };
        let scheduler =
            PollingScheduler::new(areas.clone(), registry, manager, dispatcher, polling);
        Harness {
            scheduler,
            areas,
            sink,
        }
    }

    fn workflow(trigger_service: &str, trigger_type: &str) -> WorkflowData {
        WorkflowData {
            trigger: TriggerConfig {
                service: trigger_service.to_string(),
                kind: Some(trigger_type.to_string()),
                config: HashMap::new(),
                connection_id: None,
            },
            reaction: TriggerConfig {
                service: "sink".to_string(),
                kind: Some("record".to_string()),
                config: HashMap::new(),
                connection_id: None,
            },
        }
    }

    fn timer_area(name: &str, interval_minutes: i64) -> NewArea {
        NewArea {
            name: name.to_string(),
            action_type: "timer.interval".to_string(),
            action_connection_id: None,
            reaction_type: "sink.record".to_string(),
            reaction_connection_id: None,
            workflow_data: workflow("timer", "interval"),
            timer_config: Some(TimerActionConfig {
                timer_type: "interval".to_string(),
                interval_minutes: Some(interval_minutes),
                at: None,
                days_count: None,
            }),
        }
    }

    fn service_area(name: &str, service: &str) -> NewArea {
        NewArea {
            name: name.to_string(),
            action_type: format!("{service}.anything"),
            action_connection_id: None,
            reaction_type: "sink.record".to_string(),
            reaction_connection_id: None,
            workflow_data: workflow(service, "anything"),
            timer_config: None,
        }
    }

    #[tokio::test]
    async fn due_timer_fires_once_per_window() {
        let h = harness(vec![]).await;
        h.areas.create_area(timer_area("tick", 5)).await.unwrap();

        let stats = h.scheduler.poll_timer_areas_once().await.unwrap();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(h.sink.deliveries.load(Ordering::SeqCst), 1);

        // Same window: the fire bookmark was advanced, nothing re-fires.
        let stats = h.scheduler.poll_timer_areas_once().await.unwrap();
        assert_eq!(stats.succeeded, 0);
        assert_eq!(h.sink.deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_failing_area_does_not_block_the_rest() {
        let h = harness(vec![
            Arc::new(FakeSource {
                id: "firing",
                fires: true,
                error: None,
            }),
            Arc::new(FakeSource {
                id: "broken",
                fires: false,
                error: Some(|| EngineError::IntegrationCall("remote exploded".to_string())),
            }),
        ])
        .await;
        let good = h
            .areas
            .create_area(service_area("good", "firing"))
            .await
            .unwrap();
        let bad = h
            .areas
            .create_area(service_area("bad", "broken"))
            .await
            .unwrap();

        let stats = h.scheduler.poll_service_areas_once().await.unwrap();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(h.sink.deliveries.load(Ordering::SeqCst), 1);

        let good = h.areas.get_area(good.id).await.unwrap().unwrap();
        assert_eq!(good.consecutive_failures, 0);
        assert!(good.last_fired_at.is_some());

        let bad = h.areas.get_area(bad.id).await.unwrap().unwrap();
        assert_eq!(bad.consecutive_failures, 1);
        assert!(bad.active);
    }

    #[tokio::test]
    async fn circuit_breaker_skips_repeatedly_failing_areas() {
        let h = harness(vec![Arc::new(FakeSource {
            id: "broken",
            fires: false,
            error: Some(|| EngineError::IntegrationCall("remote exploded".to_string())),
        })])
        .await;
        let area = h
            .areas
            .create_area(service_area("bad", "broken"))
            .await
            .unwrap();
        for _ in 0..5 {
            h.areas.record_failure(area.id).await.unwrap();
        }

        let stats = h.scheduler.poll_service_areas_once().await.unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);

        // The skip is visible in the execution log, not just the counters.
        let log = h.areas.recent_executions(area.id, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, "skipped");
    }

    #[tokio::test]
    async fn overlapping_service_polls_deliver_an_event_once() {
        let event_at = Utc::now() - chrono::Duration::minutes(1);
        let h = harness(vec![Arc::new(OneEventSource { event_at })]).await;
        let area = h
            .areas
            .create_area(service_area("single", "oneshot"))
            .await
            .unwrap();
        // Bookmark predates the event, so an unguarded concurrent poll
        // would see it as new twice.
        h.areas
            .update_last_checked(area.id, event_at - chrono::Duration::minutes(5))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            h.scheduler.poll_service_areas_once(),
            h.scheduler.poll_service_areas_once()
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.succeeded + second.succeeded, 1);
        assert_eq!(h.sink.deliveries.load(Ordering::SeqCst), 1);

        // The bookmark moved past the event, so later polls stay quiet.
        let stats = h.scheduler.poll_service_areas_once().await.unwrap();
        assert_eq!(stats, TickStats::default());
        assert_eq!(h.sink.deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reauthorization_failure_deactivates_the_area() {
        let h = harness(vec![Arc::new(FakeSource {
            id: "expired",
            fires: false,
            error: Some(|| EngineError::ReauthorizationRequired { connection_id: 7 }),
        })])
        .await;
        let area = h
            .areas
            .create_area(service_area("stale", "expired"))
            .await
            .unwrap();

        let stats = h.scheduler.poll_service_areas_once().await.unwrap();
        assert_eq!(stats.failed, 1);

        let reloaded = h.areas.get_area(area.id).await.unwrap().unwrap();
        assert!(!reloaded.active);
        // Deactivated, not circuit-broken: reauthorizing brings it back.
        assert_eq!(reloaded.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn quiet_trigger_advances_the_checked_bookmark() {
        let h = harness(vec![Arc::new(FakeSource {
            id: "quiet",
            fires: false,
            error: None,
        })])
        .await;
        let area = h
            .areas
            .create_area(service_area("silent", "quiet"))
            .await
            .unwrap();

        let stats = h.scheduler.poll_service_areas_once().await.unwrap();
        assert_eq!(stats, TickStats::default());

        let reloaded = h.areas.get_area(area.id).await.unwrap().unwrap();
        assert!(reloaded.last_checked_at.is_some());
        assert!(reloaded.last_fired_at.is_none());
        assert_eq!(h.sink.deliveries.load(Ordering::SeqCst), 0);
    }
}

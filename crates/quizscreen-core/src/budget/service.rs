//! Serialized command surface over the budget engine.
//!
//! One logical owner mutates the engine: commands and ticks funnel through
//! a single async mutex, so no two mutations interleave. Reads go to a
//! separately maintained copy of the last committed status and never touch
//! the writer lock.
//!
//! Command flow: catch up the clock, apply the command to a clone of the
//! engine, persist the clone's snapshot under a timeout, then commit it in
//! memory and publish the events in transition order. A failed or timed-out
//! write discards the clone, so callers never observe partial state.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::bridge::{HostBridge, NoopBridge};
use super::engine::BudgetEngine;
use super::snapshot::TimerStatus;
use crate::clock::{Clock, SystemClock};
use crate::error::{BudgetError, CoreError, DatabaseError, Result};
use crate::events::{Event, EventBus, Subscription};
use crate::rollover::{CarryoverInfo, Reconciler};
use crate::storage::{Config, Database};

struct Inner {
    engine: BudgetEngine,
}

/// Async facade owning the budget engine, its persistence, and its event
/// stream.
pub struct BudgetService {
    inner: tokio::sync::Mutex<Inner>,
    db: Database,
    recon: Reconciler,
    committed: RwLock<TimerStatus>,
    bus: EventBus,
    bridge: Arc<dyn HostBridge>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    persistence_timeout: Duration,
    catch_up_chunk_secs: u64,
}

impl BudgetService {
    /// Build the service over an open database, restoring the last
    /// persisted snapshot. The gap since the snapshot's last tick is
    /// replayed lazily by the first command or tick.
    pub fn new(
        db: Database,
        config: &Config,
        clock: Arc<dyn Clock>,
        bridge: Arc<dyn HostBridge>,
    ) -> Result<Self> {
        let engine = match db.load_snapshot()? {
            Some(snapshot) => BudgetEngine::from_snapshot(snapshot),
            None => BudgetEngine::new(clock.today()),
        };
        let recon = Reconciler::new(db.clone(), config.carryover_policy(), config.week_reset());
        Ok(Self {
            committed: RwLock::new(engine.status()),
            inner: tokio::sync::Mutex::new(Inner { engine }),
            db,
            recon,
            bus: EventBus::new(),
            bridge,
            clock,
            tick_interval: Duration::from_secs(config.timer.tick_interval_secs.max(1)),
            persistence_timeout: Duration::from_millis(config.timer.persistence_timeout_ms.max(1)),
            catch_up_chunk_secs: config.timer.catch_up_chunk_secs,
        })
    }

    /// `new` with the system clock and a no-op host bridge.
    pub fn with_defaults(db: Database, config: &Config) -> Result<Self> {
        Self::new(db, config, Arc::new(SystemClock), Arc::new(NoopBridge))
    }

    // ── Command surface ──────────────────────────────────────────────

    pub async fn start_timer(&self) -> Result<()> {
        self.command(|engine, now| Ok(engine.start(now)?.into_iter().collect()))
            .await
    }

    pub async fn pause_timer(&self) -> Result<()> {
        self.command(|engine, now| Ok(engine.pause(now).into_iter().collect()))
            .await
    }

    pub async fn stop_timer(&self) -> Result<()> {
        self.command(|engine, now| Ok(engine.stop(now).into_iter().collect()))
            .await
    }

    pub async fn set_foreground(&self, foreground: bool) -> Result<()> {
        self.command(move |engine, now| {
            Ok(engine.set_foreground(now, foreground).into_iter().collect())
        })
        .await
    }

    pub async fn add_time_from_quiz(&self, minutes: f64) -> Result<()> {
        self.command(move |engine, now| engine.add_time_from_quiz(now, minutes))
            .await
    }

    pub async fn add_time_from_goal(&self, hours: f64) -> Result<()> {
        self.command(move |engine, now| engine.add_time_from_goal(now, hours))
            .await
    }

    /// Last committed status. Never blocks behind the writer.
    pub fn status(&self) -> TimerStatus {
        self.committed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Register an observer for committed transitions.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    // ── Day boundary surface ─────────────────────────────────────────

    /// Settle any day boundary crossed since the last check. Returns
    /// whether a rollover was performed. Safe to call repeatedly.
    pub async fn check_and_process_new_day(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        self.catch_up_locked(&mut inner).await
    }

    /// Record the current day's totals without settling any score, and
    /// persist the snapshot. For app backgrounding or termination.
    pub async fn process_end_of_day(&self) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        self.catch_up_locked(&mut inner).await?;
        let now = self.clock.now();
        let recon = self.recon.clone();
        let db = self.db.clone();
        let engine = inner.engine.clone();
        self.run_db(move || {
            db.save_snapshot(engine.snapshot())?;
            recon.seal_provisional(&engine, now)
        })
        .await
    }

    /// The running score as of the start of today.
    pub async fn today_start_score(&self) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        self.catch_up_locked(&mut inner).await?;
        let recon = self.recon.clone();
        self.run_db(move || recon.today_start_score()).await
    }

    /// Carryover summary of the most recently settled day.
    pub async fn carryover_info(&self) -> Result<Option<CarryoverInfo>> {
        let mut inner = self.inner.lock().await;
        self.catch_up_locked(&mut inner).await?;
        let now = self.clock.now();
        let recon = self.recon.clone();
        self.run_db(move || recon.carryover_info(now)).await
    }

    // ── Ticking ──────────────────────────────────────────────────────

    /// Advance the engine by the wall-clock time elapsed since the last
    /// tick and persist the result. Rollovers found along the way are
    /// settled.
    pub async fn tick_once(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let before = inner.engine.clone();
        self.catch_up_locked(&mut inner).await?;
        if inner.engine != before {
            let snapshot = inner.engine.snapshot().clone();
            let db = self.db.clone();
            self.run_db(move || Ok(db.save_snapshot(&snapshot)?)).await?;
        }
        Ok(())
    }

    /// Drive `tick_once` at the configured cadence until aborted.
    pub fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = service.tick_once().await {
                    warn!(error = %e, "tick failed");
                }
            }
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn command<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BudgetEngine, DateTime<Utc>) -> Result<Vec<Event>, BudgetError>,
    {
        let mut inner = self.inner.lock().await;
        self.catch_up_locked(&mut inner).await?;

        let now = self.clock.now();
        let mut next = inner.engine.clone();
        let events = f(&mut next, now)?;
        if events.is_empty() && next == inner.engine {
            // Idempotent no-op: nothing to persist, nothing to publish.
            return Ok(());
        }

        let snapshot = next.snapshot().clone();
        let db = self.db.clone();
        self.run_db(move || Ok(db.save_snapshot(&snapshot)?)).await?;

        inner.engine = next;
        self.commit_side_effects(&inner.engine, events, now);
        Ok(())
    }

    /// Replay the clock gap (settling rollovers durably as they are found)
    /// and commit the result in memory. Returns whether a rollover ran.
    async fn catch_up_locked(&self, inner: &mut Inner) -> Result<bool> {
        let now = self.clock.now();
        let recon = self.recon.clone();
        let chunk = self.catch_up_chunk_secs;
        let mut engine = inner.engine.clone();
        let (engine, events, rolled) = self
            .run_db(move || {
                let (events, rolled) = recon.catch_up(&mut engine, now, chunk)?;
                Ok((engine, events, rolled))
            })
            .await?;

        if engine != inner.engine {
            inner.engine = engine;
            self.commit_side_effects(&inner.engine, events, now);
        }
        Ok(rolled)
    }

    fn commit_side_effects(&self, engine: &BudgetEngine, events: Vec<Event>, now: DateTime<Utc>) {
        let status = engine.status();
        *self.committed.write().unwrap_or_else(|e| e.into_inner()) = status.clone();
        for event in &events {
            self.bus.publish(event);
        }
        self.bus.publish(&Event::StateChanged {
            status: status.clone(),
            at: now,
        });
        if let Err(e) = self.bridge.sync_state(&status) {
            warn!(error = %e, "host bridge rejected state sync; retrying on next transition");
        }
    }

    async fn run_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        match tokio::time::timeout(self.persistence_timeout, tokio::task::spawn_blocking(f)).await
        {
            Err(_) => Err(DatabaseError::Timeout.into()),
            Ok(Err(join)) => Err(CoreError::Custom(format!("storage task failed: {join}"))),
            Ok(Ok(result)) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::PhaseKind;
    use crate::clock::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn service_at(clock: &ManualClock) -> BudgetService {
        let db = Database::open_memory().unwrap();
        BudgetService::new(
            db,
            &Config::default(),
            Arc::new(clock.clone()),
            Arc::new(NoopBridge),
        )
        .unwrap()
    }

    fn morning() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn start_without_budget_fails_and_grant_unlocks() {
        let clock = ManualClock::starting_at(morning());
        let service = service_at(&clock);

        assert!(matches!(
            service.start_timer().await,
            Err(CoreError::Budget(BudgetError::NoBudget))
        ));

        service.add_time_from_quiz(2.0).await.unwrap();
        service.start_timer().await.unwrap();

        let status = service.status();
        assert_eq!(status.state, PhaseKind::Running);
        assert_eq!(status.remaining_secs, 120);
    }

    #[tokio::test]
    async fn events_arrive_in_transition_order() {
        let clock = ManualClock::starting_at(morning());
        let service = service_at(&clock);
        let mut sub = service.subscribe();

        service.add_time_from_quiz(1.0).await.unwrap();
        service.start_timer().await.unwrap();

        assert!(matches!(sub.recv().await, Some(Event::GrantApplied { .. })));
        assert!(matches!(sub.recv().await, Some(Event::StateChanged { .. })));
        assert!(matches!(sub.recv().await, Some(Event::TimerStarted { .. })));
        assert!(matches!(sub.recv().await, Some(Event::StateChanged { .. })));
    }

    #[tokio::test]
    async fn idempotent_commands_publish_nothing() {
        let clock = ManualClock::starting_at(morning());
        let service = service_at(&clock);
        service.add_time_from_quiz(1.0).await.unwrap();
        service.start_timer().await.unwrap();

        let mut sub = service.subscribe();
        service.start_timer().await.unwrap(); // already running
        service.set_foreground(false).await.unwrap(); // already background

        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn ticks_consume_budget_and_survive_restart() {
        let clock = ManualClock::starting_at(morning());
        let db = Database::open_memory().unwrap();
        let service = BudgetService::new(
            db.clone(),
            &Config::default(),
            Arc::new(clock.clone()),
            Arc::new(NoopBridge),
        )
        .unwrap();

        service.add_time_from_quiz(2.0).await.unwrap();
        service.start_timer().await.unwrap();
        clock.advance(ChronoDuration::seconds(30));
        service.tick_once().await.unwrap();
        assert_eq!(service.status().remaining_secs, 90);

        // A second service over the same store picks up where this one
        // stopped, replaying the unpersisted gap from the snapshot anchor.
        clock.advance(ChronoDuration::seconds(30));
        let revived = BudgetService::new(
            db,
            &Config::default(),
            Arc::new(clock.clone()),
            Arc::new(NoopBridge),
        )
        .unwrap();
        revived.tick_once().await.unwrap();
        assert_eq!(revived.status().remaining_secs, 60);
    }

    #[tokio::test]
    async fn debt_crossing_is_published() {
        let clock = ManualClock::starting_at(morning());
        let service = service_at(&clock);
        service.add_time_from_quiz(0.5).await.unwrap();
        service.start_timer().await.unwrap();

        let mut sub = service.subscribe();
        clock.advance(ChronoDuration::seconds(45));
        service.tick_once().await.unwrap();

        assert!(matches!(
            sub.recv().await,
            Some(Event::DebtEntered { debt_secs: 15, .. })
        ));
        let status = service.status();
        assert!(status.is_in_debt_mode);
        assert_eq!(status.debt_secs, 15);
    }

    #[tokio::test]
    async fn day_check_rolls_over_once() {
        let clock = ManualClock::starting_at(morning());
        let service = service_at(&clock);
        service.add_time_from_quiz(30.0).await.unwrap();

        clock.advance(ChronoDuration::days(1));
        assert!(service.check_and_process_new_day().await.unwrap());
        assert!(!service.check_and_process_new_day().await.unwrap());

        // 30 unused minutes settled at the default reward rate.
        assert_eq!(service.today_start_score().await.unwrap(), 60);
        let info = service.carryover_info().await.unwrap().unwrap();
        assert!(info.is_positive);
        assert_eq!(info.remaining_time_minutes, 30);
        assert_eq!(service.status().remaining_secs, 0);
    }

    #[tokio::test]
    async fn end_of_day_seal_is_provisional() {
        let clock = ManualClock::starting_at(morning());
        let service = service_at(&clock);
        service.add_time_from_quiz(30.0).await.unwrap();

        assert!(service.process_end_of_day().await.unwrap());
        assert_eq!(service.today_start_score().await.unwrap(), 0);
    }
}

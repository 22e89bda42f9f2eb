//! Periodic follower checks
//!
//! A cancellable background task owned by the facade: started after login,
//! aborted on logout or shutdown. Check failures are reported on the event
//! bus and never stop the timer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::diff::{CheckOutcome, FollowerDiffEngine};
use crate::events::{Event, EventBus};
use crate::store::StateStore;

pub struct FollowerWatcher {
    engine: Arc<FollowerDiffEngine>,
    store: Arc<StateStore>,
    events: EventBus,
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FollowerWatcher {
    pub fn new(
        engine: Arc<FollowerDiffEngine>,
        store: Arc<StateStore>,
        events: EventBus,
        period: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            events,
            period,
            task: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the periodic task. Idempotent while a task is live.
    ///
    /// If the persisted last check is already older than one period (or was
    /// never recorded), a check runs immediately instead of waiting for the
    /// first tick.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let engine = Arc::clone(&self.engine);
        let events = self.events.clone();
        let period = self.period;
        let catch_up = check_is_due(&self.store, period);
        debug!(?period, catch_up, "starting follower watcher");

        *task = Some(tokio::spawn(run_loop(engine, events, period, catch_up)));
    }

    /// Abort the periodic task. Safe to call when not running.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
            debug!("stopped follower watcher");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl Drop for FollowerWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn check_is_due(store: &StateStore, period: Duration) -> bool {
    match store.last_check() {
        None => true,
        Some(last) => chrono::Utc::now().timestamp() - last >= period.as_secs() as i64,
    }
}

async fn run_loop(
    engine: Arc<FollowerDiffEngine>,
    events: EventBus,
    period: Duration,
    catch_up: bool,
) {
    if catch_up {
        tick(&engine, &events).await;
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a fresh interval completes immediately; the
    // catch-up logic above already decided whether to check now.
    interval.tick().await;

    loop {
        interval.tick().await;
        tick(&engine, &events).await;
    }
}

async fn tick(engine: &FollowerDiffEngine, events: &EventBus) {
    match engine.check().await {
        Ok(CheckOutcome::Diffed(delta)) => {
            if !delta.gained.is_empty() {
                events.emit(Event::NewFollowers {
                    count: delta.gained.len(),
                });
            }
            if !delta.lost.is_empty() {
                events.emit(Event::LostFollowers {
                    count: delta.lost.len(),
                });
            }
            events.emit(Event::CheckCompleted {
                gained: delta.gained.len(),
                lost: delta.lost.len(),
                checked_at: chrono::Utc::now().timestamp(),
            });
        }
        Ok(CheckOutcome::Seeded) => {
            events.emit(Event::CheckCompleted {
                gained: 0,
                lost: 0,
                checked_at: chrono::Utc::now().timestamp(),
            });
        }
        Ok(CheckOutcome::Skipped) => {}
        Err(err) => {
            warn!(%err, "follower check failed");
            events.emit(Event::CheckFailed {
                message: err.to_string(),
            });
        }
    }
}

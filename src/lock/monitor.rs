//! Background lock polling and countdown.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{LockEvent, LockState, LockTracker, EDITABLE_MESSAGE, READ_ONLY_MESSAGE};
use crate::api::ApiClient;
use crate::config::Config;
use crate::errors::ClientError;
use crate::models::LockStatus;
use crate::notify::{self, Notification, Notifier, READ_ERROR_PREFIX};
use crate::query::{FetchPolicy, QueryCache, QueryKey};
use crate::session::SessionContext;

pub const REFRESH_ERROR_PREFIX: &str = "Error refreshing lock";

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// What a front-end needs to render the lock dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct LockSnapshot {
    pub state: LockState,
    pub seconds_left: Option<u64>,
    pub status: Option<LockStatus>,
}

impl Default for LockSnapshot {
    fn default() -> Self {
        Self {
            state: LockState::Unlocked,
            seconds_left: None,
            status: None,
        }
    }
}

struct Inner {
    api: ApiClient,
    session: Arc<SessionContext>,
    queries: QueryCache,
    notifier: Arc<dyn Notifier>,
    tracker: Mutex<LockTracker>,
    status: Mutex<Option<LockStatus>>,
    tx: watch::Sender<LockSnapshot>,
    poll_interval: Duration,
    settle: Duration,
    countdown: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn publish(&self) -> LockSnapshot {
        let tracker = lock(&self.tracker);
        let snapshot = LockSnapshot {
            state: tracker.state(),
            seconds_left: tracker.seconds_left(Utc::now()),
            status: lock(&self.status).clone(),
        };
        drop(tracker);
        self.tx.send_replace(snapshot.clone());
        snapshot
    }

    fn handle_events(&self, events: Vec<LockEvent>) {
        for event in events {
            match event {
                LockEvent::BecameReadOnly => {
                    self.notifier.notify(Notification::info(READ_ONLY_MESSAGE))
                }
                LockEvent::BecameEditable => {
                    self.notifier.notify(Notification::info(EDITABLE_MESSAGE))
                }
                LockEvent::WarningOpened { seconds_left } => {
                    tracing::warn!("Project lock expires in {} second(s)", seconds_left)
                }
                LockEvent::WarningClosed => tracing::debug!("Lock warning closed"),
                LockEvent::Expired => tracing::warn!("Project lock expired"),
            }
        }
    }

    /// One countdown step. Returns whether the countdown should continue.
    fn tick_countdown(&self) -> bool {
        let (events, needed) = {
            let mut tracker = lock(&self.tracker);
            let events = tracker.tick(Utc::now());
            (events, tracker.state().needs_countdown())
        };
        self.handle_events(events);
        self.publish();
        needed
    }
}

fn sync_countdown(inner: &Arc<Inner>) {
    let needed = lock(&inner.tracker).state().needs_countdown();
    let mut slot = lock(&inner.countdown);

    if !needed {
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        return;
    }
    if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
        return;
    }

    let weak: Weak<Inner> = Arc::downgrade(inner);
    *slot = Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(COUNTDOWN_TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            if !inner.tick_countdown() {
                break;
            }
        }
    }));
}

/// Polls the lock status and drives the expiry countdown.
#[derive(Clone)]
pub struct LockMonitor {
    inner: Arc<Inner>,
}

impl LockMonitor {
    pub fn new(
        config: &Config,
        api: ApiClient,
        session: Arc<SessionContext>,
        queries: QueryCache,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (tx, _) = watch::channel(LockSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                api,
                session,
                queries,
                notifier,
                tracker: Mutex::new(LockTracker::new(config.lock_warning_threshold)),
                status: Mutex::new(None),
                tx,
                poll_interval: config.lock_poll_interval,
                settle: config.lock_refresh_settle,
                countdown: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LockSnapshot> {
        self.inner.tx.subscribe()
    }

    pub fn snapshot(&self) -> LockSnapshot {
        self.inner.tx.borrow().clone()
    }

    /// Whether the per-second countdown task is alive.
    pub fn is_counting_down(&self) -> bool {
        lock(&self.inner.countdown)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Fetch the lock status once and apply it.
    pub async fn poll_once(&self) -> Result<LockSnapshot, ClientError> {
        self.inner.session.ensure_ready()?;

        let api = self.inner.api.clone();
        let status = self
            .inner
            .queries
            .fetch(QueryKey::LockStatus, FetchPolicy::Always, || async move {
                api.get_lock_status().await
            })
            .await
            .map_err(|error| {
                notify::report_error(self.inner.notifier.as_ref(), READ_ERROR_PREFIX, &error);
                error
            })?;

        let events = lock(&self.inner.tracker).apply_status(&status, Utc::now());
        *lock(&self.inner.status) = Some(status);
        self.inner.handle_events(events);
        let snapshot = self.inner.publish();
        sync_countdown(&self.inner);
        Ok(snapshot)
    }

    /// Extend the lock, then re-read the status once the server has settled.
    pub async fn renew(&self) -> Result<LockSnapshot, ClientError> {
        self.inner.session.ensure_ready()?;

        if let Err(error) = self.inner.api.refresh_lock().await {
            notify::report_error(self.inner.notifier.as_ref(), REFRESH_ERROR_PREFIX, &error);
            return Err(error);
        }
        tracing::info!("Lock refresh requested");

        tokio::time::sleep(self.inner.settle).await;
        self.inner.queries.invalidate(&QueryKey::LockStatus);
        self.poll_once().await
    }

    /// Start polling every configured interval until the handle is dropped.
    ///
    /// Ticks are skipped while no session interceptor is installed.
    pub fn start(&self) -> LockMonitorHandle {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.poll_interval;

        let poll = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if !inner.session.is_installed() {
                    tracing::debug!("Session not ready, skipping lock poll");
                    continue;
                }
                let monitor = LockMonitor { inner };
                if let Err(e) = monitor.poll_once().await {
                    tracing::debug!("Lock poll failed: {}", e);
                }
            }
        });

        tracing::info!("Lock polling started every {:?}", period);
        LockMonitorHandle {
            poll,
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Stops polling and the countdown when dropped.
pub struct LockMonitorHandle {
    poll: JoinHandle<()>,
    inner: Arc<Inner>,
}

impl LockMonitorHandle {
    /// Same as dropping the handle.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for LockMonitorHandle {
    fn drop(&mut self) {
        self.poll.abort();
        if let Some(handle) = lock(&self.inner.countdown).take() {
            handle.abort();
        }
        tracing::info!("Lock polling stopped");
    }
}

//! Runboard polling controller.
//!
//! A [`PollController`] periodically re-fetches a fixed set of resources.
//! A poll is skipped while the host is hidden or while any request of an
//! earlier poll is still in flight. A not-found answer is terminal: the
//! loop stops, the entity is evicted from the local cache and a
//! [`PollEvent::NotFound`] carrying the redirect target is emitted. Other
//! failures are logged and retried on the next tick.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use runboard_core::RunboardError;

pub mod config;
pub mod tracker;

pub use config::{PollConfig, MIN_POLL_INTERVAL};
pub use tracker::{PollRequest, RequestId, RequestTracker};

pub type ResourceId = String;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("transient: {0}")]
    Transient(String),
}

impl From<RunboardError> for FetchError {
    fn from(e: RunboardError) -> Self {
        match e {
            RunboardError::NotFound(m) => FetchError::NotFound(m),
            other => FetchError::Transient(other.to_string()),
        }
    }
}

/// Remote source of the polled entities.
#[async_trait]
pub trait ResourceFetcher: Send + Sync + 'static {
    type Data: Clone + Send + Sync + 'static;

    async fn fetch(&self, resource: &str) -> Result<Self::Data, FetchError>;
}

/// Whether the host surface is currently shown to the user.
pub trait Visibility: Send + Sync + 'static {
    fn is_visible(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysVisible;

impl Visibility for AlwaysVisible {
    fn is_visible(&self) -> bool { true }
}

/// Shared visibility switch flipped by the host.
#[derive(Debug, Clone)]
pub struct VisibilityFlag(Arc<AtomicBool>);

impl VisibilityFlag {
    pub fn new(visible: bool) -> Self { Self(Arc::new(AtomicBool::new(visible))) }
    pub fn set_visible(&self, visible: bool) { self.0.store(visible, Ordering::SeqCst); }
}

impl Visibility for VisibilityFlag {
    fn is_visible(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Local copy of fetched entities, keyed by resource id.
#[derive(Debug)]
pub struct EntityCache<T> {
    inner: Arc<Mutex<FxHashMap<ResourceId, T>>>,
}

impl<T> Clone for EntityCache<T> {
    fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<T> Default for EntityCache<T> {
    fn default() -> Self { Self { inner: Arc::new(Mutex::new(FxHashMap::default())) } }
}

impl<T: Clone> EntityCache<T> {
    pub fn new() -> Self { Self::default() }
    pub fn get(&self, id: &str) -> Option<T> { lock(&self.inner).get(id).cloned() }
    pub fn upsert(&self, id: &str, value: T) { lock(&self.inner).insert(id.to_string(), value); }
    pub fn evict(&self, id: &str) -> Option<T> { lock(&self.inner).remove(id) }
    pub fn contains(&self, id: &str) -> bool { lock(&self.inner).contains_key(id) }
    pub fn len(&self) -> usize { lock(&self.inner).len() }
    pub fn is_empty(&self) -> bool { lock(&self.inner).is_empty() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Hidden,
    InFlight,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Skipped(SkipReason),
    Completed { fetched: usize, failed: usize },
    NotFound { resource: ResourceId },
}

/// Events emitted by a running poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Refreshed { fetched: usize, failed: usize },
    NotFound { resource: ResourceId, redirect_to: String },
}

struct Inner<F: ResourceFetcher, V> {
    fetcher: F,
    visibility: V,
    resources: Vec<ResourceId>,
    cache: EntityCache<F::Data>,
    tracker: Mutex<RequestTracker>,
    stopped: AtomicBool,
    halt: Notify,
    redirect_to: String,
}

/// Marks a request inactive when dropped, so cancelled fetches never block later polls.
struct InFlight<'a> {
    tracker: &'a Mutex<RequestTracker>,
    id: RequestId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.tracker).finish(self.id);
    }
}

impl<F: ResourceFetcher, V: Visibility> Inner<F, V> {
    async fn poll(&self) -> PollOutcome {
        if self.stopped.load(Ordering::SeqCst) {
            return PollOutcome::Skipped(SkipReason::Stopped);
        }
        if !self.visibility.is_visible() {
            counter!("poll_skipped_total", 1u64, "reason" => "hidden");
            return PollOutcome::Skipped(SkipReason::Hidden);
        }
        let issued: Vec<(InFlight<'_>, &ResourceId)> = {
            let mut tracker = lock(&self.tracker);
            if tracker.any_active() {
                counter!("poll_skipped_total", 1u64, "reason" => "in_flight");
                return PollOutcome::Skipped(SkipReason::InFlight);
            }
            self.resources
                .iter()
                .map(|r| (InFlight { tracker: &self.tracker, id: tracker.begin(r) }, r))
                .collect()
        };
        counter!("poll_ticks_total", 1u64);
        let started = Instant::now();

        let results = join_all(issued.into_iter().map(|(guard, resource)| async move {
            let res = self.fetcher.fetch(resource).await;
            drop(guard);
            (resource, res)
        }))
        .await;
        histogram!("poll_fetch_ms", started.elapsed().as_secs_f64() * 1000.0);

        let (mut fetched, mut failed) = (0usize, 0usize);
        let mut missing: Option<ResourceId> = None;
        for (resource, res) in results {
            match res {
                Ok(data) => {
                    self.cache.upsert(resource, data);
                    fetched += 1;
                }
                Err(FetchError::NotFound(msg)) => {
                    warn!(resource = %resource, error = %msg, "poll: resource not found; evicting");
                    self.cache.evict(resource);
                    missing.get_or_insert_with(|| resource.clone());
                }
                Err(FetchError::Transient(msg)) => {
                    warn!(resource = %resource, error = %msg, "poll: fetch failed; retrying next tick");
                    counter!("poll_fetch_errors_total", 1u64);
                    failed += 1;
                }
            }
        }

        if let Some(resource) = missing {
            self.stopped.store(true, Ordering::SeqCst);
            self.halt.notify_one();
            return PollOutcome::NotFound { resource };
        }
        debug!(fetched, failed, took_ms = %started.elapsed().as_millis(), "poll: completed");
        PollOutcome::Completed { fetched, failed }
    }
}

pub struct PollController<F: ResourceFetcher, V: Visibility> {
    inner: Arc<Inner<F, V>>,
    task: Option<JoinHandle<()>>,
    stop: Option<oneshot::Sender<()>>,
}

impl<F: ResourceFetcher, V: Visibility> PollController<F, V> {
    pub fn new(fetcher: F, visibility: V, resources: Vec<ResourceId>, redirect_to: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                visibility,
                resources,
                cache: EntityCache::new(),
                tracker: Mutex::new(RequestTracker::new()),
                stopped: AtomicBool::new(false),
                halt: Notify::new(),
                redirect_to: redirect_to.into(),
            }),
            task: None,
            stop: None,
        }
    }

    pub fn from_config(fetcher: F, visibility: V, resources: Vec<ResourceId>, config: &PollConfig) -> Self {
        Self::new(fetcher, visibility, resources, config.redirect_to.clone())
    }

    /// Handle to the locally cached entities.
    pub fn cache(&self) -> EntityCache<F::Data> { self.inner.cache.clone() }

    pub fn resources(&self) -> &[ResourceId] { &self.inner.resources }

    pub fn active_requests(&self) -> usize { lock(&self.inner.tracker).active_count() }

    pub fn issued_requests(&self) -> usize { lock(&self.inner.tracker).len() }

    /// True once a not-found answer ended polling.
    pub fn is_stopped(&self) -> bool { self.inner.stopped.load(Ordering::SeqCst) }

    pub fn is_running(&self) -> bool { self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) }

    /// Run one poll now, subject to the same visibility and in-flight guards as the loop.
    pub async fn poll(&self) -> PollOutcome { self.inner.poll().await }

    /// Start (or restart) the interval loop. The first tick fires immediately.
    /// A zero interval is raised to [`MIN_POLL_INTERVAL`].
    pub fn start_polling(&mut self, interval: Duration) -> mpsc::UnboundedReceiver<PollEvent> {
        let interval = interval.max(MIN_POLL_INTERVAL);
        self.stop_polling();
        self.inner.stopped.store(false, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel::<PollEvent>();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let inner = Arc::clone(&self.inner);
        info!(resources = inner.resources.len(), interval_ms = %interval.as_millis(), "poll: starting loop");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = inner.halt.notified() => {
                        if inner.stopped.load(Ordering::SeqCst) { break; }
                    }
                    _ = ticker.tick() => {
                        if inner.stopped.load(Ordering::SeqCst) { break; }
                        let inner = Arc::clone(&inner);
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            match inner.poll().await {
                                PollOutcome::Completed { fetched, failed } => {
                                    let _ = tx.send(PollEvent::Refreshed { fetched, failed });
                                }
                                PollOutcome::NotFound { resource } => {
                                    info!(resource = %resource, redirect = %inner.redirect_to, "poll: stopping after not found");
                                    let _ = tx.send(PollEvent::NotFound { resource, redirect_to: inner.redirect_to.clone() });
                                }
                                PollOutcome::Skipped(reason) => debug!(?reason, "poll: tick skipped"),
                            }
                        });
                    }
                }
            }
            info!("poll: loop stopped");
        });
        self.task = Some(task);
        self.stop = Some(stop_tx);
        rx
    }

    /// Stop the interval loop. In-flight fetches still complete.
    pub fn stop_polling(&mut self) {
        if let Some(stop) = self.stop.take() {
            debug!("poll: stopping loop");
            let _ = stop.send(());
        }
        self.task = None;
    }
}

impl<F: ResourceFetcher, V: Visibility> Drop for PollController<F, V> {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

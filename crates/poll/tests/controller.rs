#![forbid(unsafe_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use runboard_poll::{
    FetchError, PollController, PollEvent, PollOutcome, ResourceFetcher, SkipReason, VisibilityFlag,
};

/// Scripted fetcher: pops one answer per call, then keeps answering with the call count.
#[derive(Clone, Default)]
struct MockFetcher {
    calls: Arc<AtomicUsize>,
    script: Arc<Mutex<VecDeque<Result<usize, FetchError>>>>,
    delay: Duration,
}

impl MockFetcher {
    fn with_delay(delay: Duration) -> Self { Self { delay, ..Default::default() } }

    fn push(&self, r: Result<usize, FetchError>) { self.script.lock().unwrap().push_back(r); }

    fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl ResourceFetcher for MockFetcher {
    type Data = usize;

    async fn fetch(&self, _resource: &str) -> Result<usize, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(n))
    }
}

/// Answers per resource: names in `gone` are not found, everything else returns its name length.
#[derive(Clone, Default)]
struct KeyedFetcher {
    gone: Arc<Mutex<BTreeSet<String>>>,
}

impl KeyedFetcher {
    fn remove(&self, resource: &str) { self.gone.lock().unwrap().insert(resource.to_string()); }
}

#[async_trait]
impl ResourceFetcher for KeyedFetcher {
    type Data = usize;

    async fn fetch(&self, resource: &str) -> Result<usize, FetchError> {
        if self.gone.lock().unwrap().contains(resource) {
            return Err(FetchError::NotFound(resource.to_string()));
        }
        Ok(resource.len())
    }
}

fn controller(f: &MockFetcher, visible: &VisibilityFlag) -> PollController<MockFetcher, VisibilityFlag> {
    PollController::new(f.clone(), visible.clone(), vec!["model-a".to_string()], "/models")
}

#[tokio::test(start_paused = true)]
async fn hidden_host_issues_no_fetch() {
    let f = MockFetcher::default();
    let vis = VisibilityFlag::new(false);
    let c = controller(&f, &vis);
    assert_eq!(c.poll().await, PollOutcome::Skipped(SkipReason::Hidden));
    assert_eq!(f.calls(), 0);

    vis.set_visible(true);
    assert_eq!(c.poll().await, PollOutcome::Completed { fetched: 1, failed: 0 });
    assert_eq!(f.calls(), 1);
    assert_eq!(c.cache().get("model-a"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn in_flight_request_suppresses_new_poll() {
    let f = MockFetcher::with_delay(Duration::from_secs(5));
    let vis = VisibilityFlag::new(true);
    let c = Arc::new(controller(&f, &vis));

    let first = tokio::spawn({
        let c = Arc::clone(&c);
        async move { c.poll().await }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(c.active_requests(), 1);

    assert_eq!(c.poll().await, PollOutcome::Skipped(SkipReason::InFlight));
    assert_eq!(f.calls(), 1);

    assert_eq!(first.await.unwrap(), PollOutcome::Completed { fetched: 1, failed: 0 });
    assert_eq!(c.active_requests(), 0);
    assert_eq!(c.issued_requests(), 1);

    assert_eq!(c.poll().await, PollOutcome::Completed { fetched: 1, failed: 0 });
    assert_eq!(f.calls(), 2);
    assert_eq!(c.issued_requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn not_found_stops_loop_and_evicts() {
    let f = MockFetcher::default();
    f.push(Ok(42));
    f.push(Err(FetchError::NotFound("model-a".into())));
    let vis = VisibilityFlag::new(true);
    let mut c = controller(&f, &vis);

    let mut events = c.start_polling(Duration::from_secs(10));
    assert_eq!(events.recv().await, Some(PollEvent::Refreshed { fetched: 1, failed: 0 }));
    assert_eq!(c.cache().get("model-a"), Some(42));

    assert_eq!(
        events.recv().await,
        Some(PollEvent::NotFound { resource: "model-a".into(), redirect_to: "/models".into() })
    );
    assert!(c.is_stopped());
    assert!(!c.cache().contains("model-a"));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(f.calls(), 2);
    assert_eq!(c.poll().await, PollOutcome::Skipped(SkipReason::Stopped));
    assert_eq!(f.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_keep_polling() {
    let f = MockFetcher::default();
    f.push(Err(FetchError::Transient("502".into())));
    let vis = VisibilityFlag::new(true);
    let mut c = controller(&f, &vis);

    let mut events = c.start_polling(Duration::from_secs(10));
    assert_eq!(events.recv().await, Some(PollEvent::Refreshed { fetched: 0, failed: 1 }));
    assert!(c.cache().is_empty());
    assert_eq!(events.recv().await, Some(PollEvent::Refreshed { fetched: 1, failed: 0 }));
    assert_eq!(c.cache().get("model-a"), Some(2));
    assert!(!c.is_stopped());
    c.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn stop_polling_halts_ticks() {
    let f = MockFetcher::default();
    let vis = VisibilityFlag::new(true);
    let mut c = controller(&f, &vis);

    let mut events = c.start_polling(Duration::from_secs(10));
    assert!(events.recv().await.is_some());
    c.stop_polling();
    c.stop_polling();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(f.calls(), 1);
    assert!(!c.is_running());
}

#[tokio::test(start_paused = true)]
async fn hidden_ticks_are_skipped_by_loop() {
    let f = MockFetcher::default();
    let vis = VisibilityFlag::new(false);
    let mut c = controller(&f, &vis);

    let mut events = c.start_polling(Duration::from_secs(10));
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(f.calls(), 0);

    vis.set_visible(true);
    assert_eq!(events.recv().await, Some(PollEvent::Refreshed { fetched: 1, failed: 0 }));
    assert_eq!(f.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_interval_still_polls() {
    let f = MockFetcher::default();
    let vis = VisibilityFlag::new(true);
    let mut c = controller(&f, &vis);

    let mut events = c.start_polling(Duration::ZERO);
    assert_eq!(events.recv().await, Some(PollEvent::Refreshed { fetched: 1, failed: 0 }));
    assert!(c.is_running());
    c.stop_polling();
    assert!(!c.is_running());
}

#[tokio::test(start_paused = true)]
async fn not_found_evicts_only_the_missing_resource() {
    let f = KeyedFetcher::default();
    let vis = VisibilityFlag::new(true);
    let c = PollController::new(f.clone(), vis, vec!["model-a".to_string(), "model-bb".to_string()], "/models");

    assert_eq!(c.poll().await, PollOutcome::Completed { fetched: 2, failed: 0 });
    assert_eq!(c.cache().len(), 2);

    f.remove("model-bb");
    assert_eq!(c.poll().await, PollOutcome::NotFound { resource: "model-bb".into() });
    assert_eq!(c.cache().get("model-a"), Some(7));
    assert!(!c.cache().contains("model-bb"));
    assert!(c.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn restart_after_not_found_resumes_polling() {
    let f = MockFetcher::default();
    f.push(Err(FetchError::NotFound("model-a".into())));
    let vis = VisibilityFlag::new(true);
    let mut c = controller(&f, &vis);

    let mut events = c.start_polling(Duration::from_secs(10));
    assert!(matches!(events.recv().await, Some(PollEvent::NotFound { .. })));
    assert!(c.is_stopped());

    let mut events = c.start_polling(Duration::from_secs(10));
    assert!(!c.is_stopped());
    assert_eq!(events.recv().await, Some(PollEvent::Refreshed { fetched: 1, failed: 0 }));
    assert_eq!(c.cache().get("model-a"), Some(2));
    c.stop_polling();
}

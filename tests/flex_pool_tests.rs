use futures_bworker::{ErrorList, ErrorSlot, FlexConfig, FlexPool};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::time::sleep;

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,futures_bworker=debug"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

fn counting_job(
  counter: Arc<AtomicUsize>,
  fail: bool,
) -> impl FnMut() -> futures::future::Ready<Result<(), String>> + Send + 'static {
  move || {
    counter.fetch_add(1, Ordering::SeqCst);
    if fail {
      futures::future::ready(Err("an error".to_string()))
    } else {
      futures::future::ready(Ok(()))
    }
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_jobs_with_retry_record_each_failing_job_once() {
  setup_tracing_for_test();
  let slot = ErrorSlot::new();
  let list = ErrorList::new();
  let config = FlexConfig::new()
    .with_name("flex_retry")
    .with_retry(3)
    .with_error(slot.clone())
    .with_errors(list.clone());
  let pool = FlexPool::new(Handle::current(), config);
  let runs = Arc::new(AtomicUsize::new(0));

  let (num_jobs, num_failing) = (2000, 500);
  for i in 0..num_jobs {
    pool.submit(counting_job(runs.clone(), i < num_failing));
    let counter = runs.clone();
    pool.submit_simple(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async {}
    });
  }
  pool.wait().await;

  assert_eq!(runs.load(Ordering::SeqCst), num_failing * (1 + 3) + (num_jobs - num_failing) + num_jobs);
  assert!(slot.is_set());
  assert_eq!(list.len(), num_failing);
  pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_jobs_run_concurrently() {
  setup_tracing_for_test();
  let pool = FlexPool::new(Handle::current(), FlexConfig::default());
  let done = Arc::new(AtomicUsize::new(0));

  let start = Instant::now();
  for _ in 0..100 {
    let done = done.clone();
    pool.submit_simple(move || {
      let done = done.clone();
      async move {
        sleep(Duration::from_millis(200)).await;
        done.fetch_add(1, Ordering::SeqCst);
      }
    });
  }
  pool.wait().await;

  assert_eq!(done.load(Ordering::SeqCst), 100);
  assert!(start.elapsed() < Duration::from_millis(600), "jobs did not overlap: {:?}", start.elapsed());

  let again = Instant::now();
  pool.wait().await;
  assert!(again.elapsed() < Duration::from_millis(50));
  pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_after_shutdown_never_runs() {
  setup_tracing_for_test();
  let pool = FlexPool::new(Handle::current(), FlexConfig::default());
  let runs = Arc::new(AtomicUsize::new(0));

  pool.shutdown().await;
  assert!(pool.is_dead());
  pool.submit(counting_job(runs.clone(), false));
  let counter = runs.clone();
  pool.submit_simple(move || {
    counter.fetch_add(1, Ordering::SeqCst);
    async {}
  });
  pool.wait().await;
  sleep(Duration::from_millis(50)).await;

  assert_eq!(runs.load(Ordering::SeqCst), 0);
  assert_eq!(pool.in_flight_count(), 0);
  assert!(pool.is_dead());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_waits_for_running_jobs() {
  setup_tracing_for_test();
  let pool = FlexPool::new(Handle::current(), FlexConfig::default());
  let done = Arc::new(AtomicUsize::new(0));

  let mut rng = rand::rng();
  let durations: Vec<u64> = (0..20).map(|_| rng.random_range(10..80)).collect();
  drop(rng);

  for millis in durations {
    let done = done.clone();
    pool.submit_simple(move || {
      let done = done.clone();
      async move {
        sleep(Duration::from_millis(millis)).await;
        done.fetch_add(1, Ordering::SeqCst);
      }
    });
  }
  pool.shutdown().await;

  assert_eq!(done.load(Ordering::SeqCst), 20);
  assert_eq!(pool.in_flight_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_shutdown_is_idempotent() {
  setup_tracing_for_test();
  let pool = FlexPool::new(Handle::current(), FlexConfig::default());

  let mut handles = Vec::new();
  for _ in 0..16 {
    let pool = pool.clone();
    handles.push(tokio::spawn(async move { pool.shutdown().await }));
  }
  for handle in handles {
    handle.await.unwrap();
  }
  assert!(pool.is_dead());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reset_errors() {
  setup_tracing_for_test();

  let bare = FlexPool::new(Handle::current(), FlexConfig::default());
  bare.submit(counting_job(Arc::new(AtomicUsize::new(0)), true));
  bare.wait().await;
  bare.reset_err();
  bare.reset_errs();

  let slot = ErrorSlot::new();
  let list = ErrorList::new();
  let pool = FlexPool::new(
    Handle::current(),
    FlexConfig::new().with_error(slot.clone()).with_errors(list.clone()),
  );
  let runs = Arc::new(AtomicUsize::new(0));

  pool.submit(counting_job(runs.clone(), true));
  pool.submit(counting_job(runs.clone(), true));
  pool.wait().await;
  assert!(slot.is_set());
  assert_eq!(list.len(), 2);

  pool.reset_err();
  pool.reset_errs();
  assert!(slot.get().is_none());
  assert!(list.is_empty());
  pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_job_is_recorded() {
  setup_tracing_for_test();
  let slot = ErrorSlot::new();
  let pool = FlexPool::new(Handle::current(), FlexConfig::new().with_error(slot.clone()));

  pool.submit_simple(|| async { panic!("flex job blew up") });
  pool.wait().await;

  let err = slot.get().expect("panic should be recorded");
  assert!(err.is_panic());
  assert_eq!(err.to_string(), "job panicked: flex job blew up");
  pool.shutdown().await;
}

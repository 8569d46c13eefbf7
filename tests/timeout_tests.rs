use rstest::rstest;
use settle::{Deferred, Dispatch, Failure};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[rstest]
fn slow_supplier_times_out_at_deadline() {
    let started = Instant::now();
    let guarded = Deferred::supply(|| {
        thread::sleep(Duration::from_millis(200));
        "late"
    })
    .or_timeout(Duration::from_millis(50));

    assert_eq!(guarded.join(), Err(Failure::Timeout));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(190));
}

#[rstest]
fn fast_supplier_is_unaffected() {
    let guarded = Deferred::supply(|| 3).or_timeout(Duration::from_millis(100));
    assert_eq!(guarded.join(), Ok(3));
    thread::sleep(Duration::from_millis(150));
    assert_eq!(guarded.join(), Ok(3));
}

#[rstest]
fn timeout_completes_the_cell_exactly_once() {
    let cell = Deferred::<u8>::new();
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    cell.on_complete(Dispatch::Inline, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let _first = cell.or_timeout(Duration::from_millis(10));
    let _second = cell.or_timeout(Duration::from_millis(15));
    let _fallback = cell.complete_on_timeout(9, Duration::from_millis(20));

    assert_eq!(cell.join(), Err(Failure::Timeout));
    thread::sleep(Duration::from_millis(40));
    assert_eq!(cell.join(), Err(Failure::Timeout));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[rstest]
fn complete_on_timeout_feeds_downstream_steps() {
    let label = Deferred::<u32>::new()
        .complete_on_timeout(404, Duration::from_millis(10))
        .map(|code| format!("status {code}"));
    assert_eq!(label.join(), Ok("status 404".to_string()));
}

#[rstest]
fn join_timeout_leaves_cell_pending() {
    let cell = Deferred::<u8>::new();
    assert_eq!(cell.join_timeout(Duration::from_millis(5)), Err(Failure::Timeout));
    assert!(!cell.is_done());
    cell.complete(1);
    assert_eq!(cell.join_timeout(Duration::from_millis(5)), Ok(1));
}

#[rstest]
fn or_timeout_on_done_cell_is_a_no_op() {
    let cell = Deferred::<u8>::failed(Failure::Canceled).or_timeout(Duration::ZERO);
    thread::sleep(Duration::from_millis(5));
    assert_eq!(cell.join(), Err(Failure::Canceled));
}

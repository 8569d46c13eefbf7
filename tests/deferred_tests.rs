use rstest::rstest;
use settle::{CancelToken, Deferred, Dispatch, Failure, StateError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

// =============================================================================
// Producing and Joining
// =============================================================================

#[rstest]
fn supply_then_map_joins_to_doubled_value() {
    let doubled = Deferred::supply(|| 10).map(|value| value * 2);
    assert_eq!(doubled.join(), Ok(20));
}

#[rstest]
fn panicking_supplier_recovered_to_fallback() {
    let recovered = Deferred::supply(|| -> &'static str { panic!("boom") }).recover(|failure| {
        assert!(matches!(failure, Failure::Computation(_)));
        Ok("fallback")
    });
    assert_eq!(recovered.join(), Ok("fallback"));
}

#[rstest]
fn panicking_supplier_surfaces_as_computation_failure() {
    let failed = Deferred::supply(|| -> u8 { panic!("boom") });
    let failure = failed.join().unwrap_err();
    assert!(matches!(failure, Failure::Computation(_)));
    assert!(failure.to_string().contains("panic: boom"));
    assert!(failed.is_completed_exceptionally());
}

#[rstest]
fn join_from_many_threads_sees_same_value() {
    let cell = Deferred::new();
    let joiners: Vec<_> = (0..8)
        .map(|_| {
            let cell = cell.clone();
            thread::spawn(move || cell.join())
        })
        .collect();

    thread::sleep(Duration::from_millis(10));
    cell.complete("shared".to_string());

    for joiner in joiners {
        assert_eq!(joiner.join().unwrap(), Ok("shared".to_string()));
    }
}

// =============================================================================
// Non-blocking Access
// =============================================================================

#[rstest]
fn get_now_returns_default_until_done() {
    let cell = Deferred::new();
    assert_eq!(cell.get_now(-1), Ok(-1));
    cell.fail(Failure::Timeout);
    assert_eq!(cell.get_now(-1), Err(Failure::Timeout));
}

#[rstest]
#[case::pending(None, Err(StateError::NotCompleted))]
#[case::completed(Some(Ok(4)), Ok(4))]
#[case::failed(Some(Err(Failure::Canceled)), Err(StateError::Failed(Failure::Canceled)))]
fn try_result_now_by_state(
    #[case] outcome: Option<Result<i32, Failure>>,
    #[case] expected: Result<i32, StateError>,
) {
    let cell = Deferred::new();
    match outcome {
        Some(Ok(value)) => {
            cell.complete(value);
        }
        Some(Err(failure)) => {
            cell.fail(failure);
        }
        None => {}
    }
    assert_eq!(cell.try_result_now(), expected);
}

#[rstest]
fn failure_now_returns_failure() {
    let cell = Deferred::<()>::failed(Failure::message("gone"));
    assert_eq!(cell.failure_now(), Failure::message("gone"));
}

#[rstest]
#[should_panic(expected = "deferred completed exceptionally")]
fn result_now_panics_on_failed_cell() {
    let _ = Deferred::<i32>::failed(Failure::Timeout).result_now();
}

// =============================================================================
// Exactly-once Completion
// =============================================================================

#[rstest]
fn only_first_completion_counts() {
    let cell = Deferred::new();
    assert!(cell.fail(Failure::message("first")));
    assert!(!cell.complete(1));
    assert!(!cell.cancel(true));
    assert_eq!(cell.join(), Err(Failure::message("first")));
}

#[rstest]
fn late_continuation_sees_same_outcome_as_early_one() {
    let cell = Deferred::new();
    let (sender, receiver) = mpsc::channel();
    let early = sender.clone();
    cell.on_complete(Dispatch::Inline, move |outcome| early.send(outcome).unwrap());
    cell.complete(3);
    cell.on_complete(Dispatch::Inline, move |outcome| sender.send(outcome).unwrap());

    assert_eq!(receiver.recv().unwrap(), Ok(3));
    assert_eq!(receiver.recv().unwrap(), Ok(3));
}

#[rstest]
fn pooled_callback_runs_after_completion() {
    let cell = Deferred::new();
    let (sender, receiver) = mpsc::channel();
    cell.on_complete(Dispatch::Pooled, move |outcome| sender.send(outcome).unwrap());
    cell.complete("pooled");
    assert_eq!(
        receiver.recv_timeout(Duration::from_secs(5)).unwrap(),
        Ok("pooled")
    );
}

// =============================================================================
// Cancellation
// =============================================================================

#[rstest]
fn cancel_fires_continuations_with_canceled() {
    let cell = Deferred::<u8>::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let observed = cell.handle_into(move |outcome| {
        counter.fetch_add(1, Ordering::SeqCst);
        outcome.is_err()
    });

    assert!(cell.cancel(false));
    assert_eq!(observed.join(), Ok(true));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
fn parent_token_reaches_running_supplier() {
    let parent = CancelToken::new();
    let (started, ready) = mpsc::channel();
    let cell = Deferred::supply_cancellable(&parent, move |token| {
        started.send(()).unwrap();
        let mut polls = 0_u32;
        while !token.is_canceled() {
            polls += 1;
            thread::sleep(Duration::from_millis(1));
        }
        polls
    });

    ready.recv().unwrap();
    parent.cancel();
    assert!(cell.join().is_ok());
    assert!(cell.token().is_canceled());
}

#[rstest]
fn canceling_cell_leaves_siblings_running() {
    let parent = CancelToken::new();
    let first = Deferred::<u8>::with_parent(&parent);
    let second = Deferred::<u8>::with_parent(&parent);

    first.cancel(true);

    assert!(first.token().is_canceled());
    assert!(!second.token().is_canceled());
    assert!(!parent.is_canceled());
}

#[rstest]
fn join_cancellable_returns_canceled_when_token_fires_first() {
    let cell = Deferred::<i32>::new();
    let token = CancelToken::new();
    let canceler = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            token.cancel();
        })
    };
    assert_eq!(cell.join_cancellable(&token), Err(Failure::Canceled));
    canceler.join().unwrap();
}

// =============================================================================
// Forced Writes
// =============================================================================

#[rstest]
fn force_fail_overwrites_completed_cell() {
    let cell = Deferred::completed(1);
    cell.force_fail(Failure::message("diagnostic"));
    assert_eq!(cell.join(), Err(Failure::message("diagnostic")));
    assert!(cell.is_completed_exceptionally());
}

use rstest::rstest;
use settle::{BoundedExecutor, Deferred, Dispatch, Failure, ThreadExecutor};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

// =============================================================================
// Pipelines
// =============================================================================

#[rstest]
fn pipeline_of_operators() {
    let report = Deferred::supply(|| vec![3, 1, 2])
        .map(|mut values| {
            values.sort_unstable();
            values
        })
        .flat_map(|values| Deferred::supply(move || values.iter().sum::<i32>()))
        .peek(|outcome| assert!(outcome.is_ok()))
        .handle_into(|outcome| match outcome {
            Ok(total) => format!("total={total}"),
            Err(failure) => format!("error={failure}"),
        });

    assert_eq!(report.join(), Ok("total=6".to_string()));
}

#[rstest]
fn failure_skips_value_steps_until_recovery() {
    let (sender, receiver) = mpsc::channel::<&str>();
    let mapped_sender = sender.clone();
    let recovered = Deferred::<i32>::failed(Failure::message("upstream"))
        .map(move |value| {
            mapped_sender.send("map").unwrap();
            value
        })
        .then_run(move || sender.send("run").unwrap())
        .recover(|failure| {
            assert_eq!(failure, Failure::message("upstream"));
            Ok(())
        });

    assert_eq!(recovered.join(), Ok(()));
    assert!(receiver.try_recv().is_err());
}

#[rstest]
fn peek_observer_panic_does_not_mask_failure() {
    let observed = Deferred::<u8>::failed(Failure::Timeout)
        .peek(|_| panic!("observer failure"))
        .peek(|outcome| assert_eq!(*outcome, Err(Failure::Timeout)));
    assert_eq!(observed.join(), Err(Failure::Timeout));
}

#[rstest]
fn or_else_replaces_failed_primary() {
    let answer = Deferred::supply(|| -> &'static str { panic!("primary down") })
        .or_else(|_| Deferred::supply(|| "replica"));
    assert_eq!(answer.join(), Ok("replica"));
}

#[rstest]
fn recover_can_resignal_a_different_failure() {
    let remapped = Deferred::<u8>::failed(Failure::Timeout)
        .recover(|_| Err(Failure::message("retry budget exhausted")));
    assert_eq!(remapped.join(), Err(Failure::message("retry budget exhausted")));
}

#[rstest]
fn handle_turns_failure_into_value() {
    let folded = Deferred::<i32>::failed(Failure::Canceled).handle(|outcome| outcome.unwrap_or(0));
    assert_eq!(folded.join(), Ok(0));
}

// =============================================================================
// Dispatch
// =============================================================================

#[rstest]
fn inline_step_runs_on_completing_thread() {
    let source = Deferred::new();
    let observed = source.map(|_: ()| thread::current().name().map(str::to_owned));
    let completer = {
        let source = source.clone();
        thread::Builder::new()
            .name("completer".to_owned())
            .spawn(move || source.complete(()))
            .unwrap()
    };
    assert!(completer.join().unwrap());
    assert_eq!(observed.join(), Ok(Some("completer".to_owned())));
}

#[rstest]
fn pooled_step_runs_on_worker_thread() {
    let source = Deferred::new();
    let observed = source.map_with(Dispatch::Pooled, |_: ()| {
        thread::current().name().map(str::to_owned)
    });
    source.complete(());
    assert_eq!(observed.join(), Ok(Some("settle-worker".to_owned())));
}

#[rstest]
fn explicit_executor_overrides_default_for_one_step() {
    let observed = Deferred::completed(())
        .map_with(Dispatch::On(Arc::new(ThreadExecutor)), |()| {
            thread::current().name().map(str::to_owned)
        })
        .map(|name| name.unwrap_or_default());
    assert_eq!(observed.join(), Ok("settle-thread".to_owned()));
}

#[rstest]
fn pooled_steps_on_saturated_executor_complete() {
    let executor = Arc::new(BoundedExecutor::new(1));
    let dispatch = Dispatch::On(executor.clone());
    let chained = Deferred::supply_on(&executor, || 1)
        .map_with(dispatch.clone(), |value| value + 1)
        .flat_map_with(dispatch.clone(), |value| Deferred::completed(value * 10))
        .map_with(dispatch, |value| value + 1);
    assert_eq!(chained.join_timeout(Duration::from_secs(5)), Ok(21));
}

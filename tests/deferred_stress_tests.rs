use rstest::rstest;
use settle::{Deferred, Dispatch, Failure, join_all_values};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const ROUNDS: usize = 200;

// =============================================================================
// Exactly-once Completion
// =============================================================================

#[rstest]
fn concurrent_completion_has_one_winner() {
    for _ in 0..ROUNDS {
        let cell = Deferred::new();
        let barrier = Arc::new(Barrier::new(8));
        let attempts: Vec<_> = (0..8_usize)
            .map(|index| {
                let cell = cell.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let won = match index % 3 {
                        0 => cell.complete(index),
                        1 => cell.fail(Failure::message(index.to_string())),
                        _ => cell.cancel(false),
                    };
                    (index, won)
                })
            })
            .collect();

        let winners: Vec<usize> = attempts
            .into_iter()
            .map(|attempt| attempt.join().unwrap())
            .filter_map(|(index, won)| won.then_some(index))
            .collect();

        assert_eq!(winners.len(), 1);
        let winner = winners[0];
        let expected = match winner % 3 {
            0 => Ok(winner),
            1 => Err(Failure::message(winner.to_string())),
            _ => Err(Failure::Canceled),
        };
        assert_eq!(cell.join(), expected);
    }
}

// =============================================================================
// Continuation Completeness
// =============================================================================

#[rstest]
fn registrations_racing_completion_all_fire_once() {
    for _ in 0..ROUNDS {
        let cell = Deferred::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(9));

        let registrars: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..4 {
                        let calls = Arc::clone(&calls);
                        cell.on_complete(Dispatch::Inline, move |outcome| {
                            assert_eq!(outcome, Ok(17));
                            calls.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        barrier.wait();
        cell.complete(17);
        for registrar in registrars {
            registrar.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 32);
    }
}

#[rstest]
fn joiners_racing_completion_all_return() {
    for _ in 0..ROUNDS {
        let cell = Deferred::new();
        let barrier = Arc::new(Barrier::new(5));
        let joiners: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cell.join()
                })
            })
            .collect();

        barrier.wait();
        cell.complete("done");
        for joiner in joiners {
            assert_eq!(joiner.join().unwrap(), Ok("done"));
        }
    }
}

#[rstest]
fn force_set_racing_completion_settles_cleanly() {
    for round in 0..ROUNDS {
        let cell = Deferred::new();
        let observed = cell.map(|value: usize| value);
        let barrier = Arc::new(Barrier::new(2));
        let forcer = {
            let cell = cell.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cell.force_set(round + 1);
            })
        };

        barrier.wait();
        let completed = cell.complete(round);
        forcer.join().unwrap();

        assert_eq!(cell.join(), Ok(round + 1));
        let expected = if completed { round } else { round + 1 };
        assert_eq!(observed.join(), Ok(expected));
    }
}

// =============================================================================
// Fan-in
// =============================================================================

#[rstest]
fn wide_fan_in_collects_every_value() {
    let cells: Vec<_> = (0..256_usize).map(|index| Deferred::supply(move || index)).collect();
    let values = join_all_values(cells).join().unwrap();
    assert_eq!(values, (0..256).collect::<Vec<_>>());
}

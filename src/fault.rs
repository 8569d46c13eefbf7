//! Fault boundary for user-supplied computations.
//!
//! Every callback the crate runs on a caller's behalf (suppliers, mapping
//! functions, recovery handlers, observers, executor tasks) goes through [`trap`].
//! A panic inside the callback is caught and turned into
//! [`Failure::Computation`] so it never unwinds into the completing thread or
//! kills a worker.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::Failure;

/// Runs `function`, converting a panic into [`Failure::Computation`].
///
/// The panic payload is preserved in the cause as `panic: <payload>` when it is
/// a `&str` or `String`.
///
/// # Errors
///
/// Returns `Err(Failure::Computation(..))` if `function` panics.
///
/// # Examples
///
/// ```rust
/// use settle::fault::trap;
///
/// assert_eq!(trap(|| 21 * 2), Ok(42));
///
/// let failure = trap(|| -> i32 { panic!("boom") }).unwrap_err();
/// assert!(failure.to_string().contains("panic: boom"));
/// ```
pub fn trap<R, F>(function: F) -> Result<R, Failure>
where
    F: FnOnce() -> R,
{
    catch_unwind(AssertUnwindSafe(function))
        .map_err(|payload| Failure::message(format!("panic: {}", panic_message(&*payload))))
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn trap_returns_value_on_success() {
        assert_eq!(trap(|| "ok"), Ok("ok"));
    }

    #[rstest]
    fn trap_converts_str_panic() {
        let failure = trap(|| -> () { panic!("static message") }).unwrap_err();
        assert_eq!(failure, Failure::message("panic: static message"));
    }

    #[rstest]
    fn trap_converts_formatted_panic() {
        let code = 7;
        let failure = trap(|| -> () { panic!("code {code}") }).unwrap_err();
        assert_eq!(failure, Failure::message("panic: code 7"));
    }

    #[rstest]
    fn trap_handles_non_string_payload() {
        let failure = trap(|| -> u8 { std::panic::panic_any(42_u8) }).unwrap_err();
        assert!(failure.to_string().contains("non-string panic payload"));
    }

    #[rstest]
    fn trap_allows_borrowing_closures() {
        let values = vec![1, 2, 3];
        assert_eq!(trap(|| values.iter().sum::<i32>()), Ok(6));
    }
}

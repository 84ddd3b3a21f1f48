//! Deadlines for operations handed to either controller.
//!
//! The operation runs as its own tokio task, and the composed future only decides which
//! outcome it reports. The timer lives inside the composed future and is released exactly
//! once, whichever way that future ends: the operation settles, the deadline fires or the
//! future is dropped.
//!
//! A timeout does not stop the operation. It keeps running detached until it finishes, unless
//! it observes its [`CancellationToken`](crate::CancellationToken) and someone cancels it.

use std::{future::Future, panic, time::Duration};

use futures::{future::BoxFuture, FutureExt};
use shared::error::OperationError;
use tracing::debug;

/// Resolves with `future`'s outcome, or with [`OperationError::Timeout`] once `duration`
/// elapses first.
///
/// `future` is spawned on the current tokio runtime and left running when the deadline fires.
/// A panic inside it resumes in the caller.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, OperationError>
where
    F: Future<Output = Result<T, OperationError>> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::spawn(future);
    tokio::select! {
        joined = task => match joined {
            Ok(outcome) => outcome,
            Err(error) if error.is_panic() => panic::resume_unwind(error.into_panic()),
            Err(error) => Err(OperationError::operation(error)),
        },
        () = tokio::time::sleep(duration) => {
            debug!(timeout = ?duration, "operation timed out, leaving it running");
            Err(OperationError::Timeout)
        }
    }
}

/// Wraps a one-shot operation with a deadline, typically a query operation taking its
/// [`CancellationToken`](crate::CancellationToken).
pub fn timeout_operation<A, F, Fut, T>(
    operation: F,
    duration: Duration,
) -> impl FnOnce(A) -> BoxFuture<'static, Result<T, OperationError>>
where
    F: FnOnce(A) -> Fut,
    Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    T: Send + 'static,
{
    move |argument| with_timeout(duration, operation(argument)).boxed()
}

/// Wraps a reusable operation, such as a mutation, with a deadline applied to every call.
pub fn timeout_mutation<I, F, Fut, T>(
    operation: F,
    duration: Duration,
) -> impl Fn(I) -> BoxFuture<'static, Result<T, OperationError>> + Send + Sync + 'static
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    T: Send + 'static,
{
    move |input| with_timeout(duration, operation(input)).boxed()
}

//! Imperatively triggered mutation controller.

use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures::{future::BoxFuture, FutureExt};
use shared::{domain::ResetPolicy, error::OperationError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    options::MutationOptions,
    reducer::{Event, State},
};

type MutationFn<I, R> = dyn Fn(I) -> BoxFuture<'static, Result<R, OperationError>> + Send + Sync;

/// Runs a write-like operation on demand and records its outcome.
///
/// Unlike a query, a failed [`MutationController::execute`] hands the error back to its
/// caller as well as recording it. Overlapping calls are not serialized: the state reflects
/// whichever call settled last. Clones share the same operation and state.
///
/// The state is only updated while the `execute` future is polled; dropping it before it
/// completes leaves the state loading until the next call or [`MutationController::reset`].
pub struct MutationController<I, R> {
    operation: Arc<MutationFn<I, R>>,
    state: Arc<watch::Sender<State<R>>>,
    reset_epoch: Arc<AtomicU64>,
    options: MutationOptions,
}

impl<I, R> MutationController<I, R>
where
    I: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, OperationError>> + Send + 'static,
    {
        Self::with_options(operation, MutationOptions::default())
    }

    pub fn with_options<F, Fut>(operation: F, options: MutationOptions) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, OperationError>> + Send + 'static,
    {
        let (state, _) = watch::channel(State::default());
        let operation: Arc<MutationFn<I, R>> = Arc::new(move |input: I| operation(input).boxed());
        Self {
            operation,
            state: Arc::new(state),
            reset_epoch: Arc::new(AtomicU64::new(0)),
            options,
        }
    }

    pub async fn execute(&self, input: I) -> Result<R, OperationError> {
        let epoch = self.reset_epoch.load(Ordering::Acquire);
        self.state.send_modify(|state| state.apply(Event::Pending));
        debug!("mutation started");

        let outcome = (self.operation)(input).await;
        let event = match &outcome {
            Ok(result) => Event::Resolved(result.clone()),
            Err(error) => Event::Rejected(error.clone()),
        };
        self.settle(epoch, event);
        outcome
    }

    /// Returns the state to its initial value. See [`ResetPolicy`] for what happens to calls
    /// still in flight.
    pub fn reset(&self) {
        self.reset_epoch.fetch_add(1, Ordering::AcqRel);
        self.state.send_modify(|state| state.apply(Event::Reset));
        info!("mutation state reset");
    }

    pub fn state(&self) -> State<R> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<State<R>> {
        self.state.subscribe()
    }

    pub fn options(&self) -> MutationOptions {
        self.options
    }

    fn settle(&self, epoch: u64, event: Event<R>) {
        let fence = self.options.reset_policy == ResetPolicy::DiscardInFlight;
        let applied = self.state.send_if_modified(|state| {
            if fence && self.reset_epoch.load(Ordering::Acquire) != epoch {
                return false;
            }
            state.apply(event);
            true
        });

        if applied {
            debug!("mutation settled");
        } else {
            warn!("discarding mutation settlement started before a reset");
        }
    }
}

impl<I, R> Clone for MutationController<I, R> {
    fn clone(&self) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
            state: Arc::clone(&self.state),
            reset_epoch: Arc::clone(&self.reset_epoch),
            options: self.options,
        }
    }
}

impl<I, R> fmt::Debug for MutationController<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationController")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tests/mutation_tests.rs"]
mod tests;

//! Dependency-driven query controller.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Weak},
};

use shared::{domain::GenerationId, error::OperationError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    cancellation::CancellationToken,
    generation::{Generation, GenerationSlot, Settlement},
    options::QueryOptions,
    reducer::{Event, State},
};

struct Shared<T> {
    state: watch::Sender<State<T>>,
    slot: Arc<GenerationSlot>,
}

impl<T> Shared<T> {
    fn settle(&self, generation: &Generation, event: Event<T>) -> Settlement {
        self.slot.settle(generation, || {
            self.state.send_modify(|state| state.apply(event));
        })
    }
}

/// Runs one operation per dependency snapshot and keeps its [`State`] free of stale results.
///
/// Every call to [`QueryController::start`] with a snapshot different from the previous one
/// starts a new generation: the previous generation is retired (its token cancelled if it had
/// not settled), `Pending` is emitted and the operation is spawned on the current tokio
/// runtime with the new generation's [`CancellationToken`]. A settlement is applied only while
/// its generation is current and has not been aborted.
///
/// Failures are never returned to the caller; they are recorded in [`State::error`]. That
/// includes starting outside of a tokio runtime, which rejects the generation without
/// invoking the operation.
pub struct QueryController<T, D> {
    shared: Arc<Shared<T>>,
    options: QueryOptions,
    dependencies: Option<D>,
    next_generation: GenerationId,
}

impl<T, D> QueryController<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: PartialEq,
{
    pub fn new() -> Self {
        Self::with_options(QueryOptions::default())
    }

    pub fn with_options(options: QueryOptions) -> Self {
        let (state, _) = watch::channel(State::default());
        Self {
            shared: Arc::new(Shared {
                state,
                slot: Arc::default(),
            }),
            options,
            dependencies: None,
            next_generation: GenerationId::FIRST,
        }
    }

    /// Starts a new generation unless `dependencies` equals the previous snapshot, in which
    /// case `operation` is dropped without being called.
    pub fn start<F, Fut>(&mut self, dependencies: D, operation: F) -> (State<T>, AbortHandle)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        if self.dependencies.as_ref() != Some(&dependencies) {
            self.dependencies = Some(dependencies);
            self.begin(operation);
        }

        (self.state(), self.abort_handle())
    }

    /// Like [`QueryController::start`] for operations that never look at their token.
    pub fn start_plain<F, Fut>(
        &mut self,
        dependencies: D,
        operation: F,
    ) -> (State<T>, AbortHandle)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        self.start(dependencies, move |_token| operation())
    }

    pub fn state(&self) -> State<T> {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<State<T>> {
        self.shared.state.subscribe()
    }

    pub fn generation(&self) -> Option<GenerationId> {
        self.shared.slot.current_id()
    }

    /// Cancels the current generation's token. The generation settles as aborted unless it
    /// already settled.
    pub fn abort(&self) {
        abort_current(&self.shared.slot);
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            slot: Arc::downgrade(&self.shared.slot),
        }
    }

    /// Retires the current generation without emitting anything and cancels its token, settled
    /// or not. The next [`QueryController::start`] always begins a new generation.
    pub fn teardown(&mut self) {
        self.dependencies = None;
        if let Some(generation) = self.shared.slot.teardown() {
            debug!(generation = generation.0, "generation torn down");
        }
    }

    fn begin<F, Fut>(&mut self, operation: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        if let Some(previous) = self.shared.slot.supersede() {
            debug!(generation = previous.0, "generation superseded");
        }

        let id = self.next_generation;
        self.next_generation = id.next();
        let token = self.options.token_for_generation();
        let generation = Arc::new(Generation::new(id, token.clone()));

        let shared = &self.shared;
        shared.slot.install(Arc::clone(&generation), || {
            shared.state.send_modify(|state| state.apply(Event::Pending));
        });
        debug!(generation = id.0, inert = token.is_inert(), "generation started");

        let weak_shared = Arc::downgrade(&self.shared);
        let weak_generation = Arc::downgrade(&generation);
        generation.on_cancel(move || {
            let (Some(shared), Some(generation)) =
                (weak_shared.upgrade(), weak_generation.upgrade())
            else {
                return;
            };
            if shared.settle(&generation, Event::Rejected(OperationError::Aborted))
                == Settlement::Applied
            {
                info!(generation = generation.id.0, "generation aborted");
            }
        });

        if token.is_cancelled() {
            debug!(
                generation = id.0,
                "token cancelled before the operation started"
            );
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(error) => {
                warn!(generation = id.0, %error, "no tokio runtime to run the operation on");
                self.shared
                    .settle(&generation, Event::Rejected(OperationError::operation(error)));
                return;
            }
        };

        let future = operation(token);
        let weak_shared = Arc::downgrade(&self.shared);
        runtime.spawn(async move {
            let outcome = future.await;
            let Some(shared) = weak_shared.upgrade() else {
                return;
            };
            let event = match outcome {
                Ok(data) => Event::Resolved(data),
                Err(error) => Event::Rejected(error),
            };
            match shared.settle(&generation, event) {
                Settlement::Applied => debug!(generation = generation.id.0, "generation settled"),
                Settlement::Stale => debug!(
                    generation = generation.id.0,
                    "discarding settlement of a superseded generation"
                ),
                Settlement::AlreadySettled => debug!(
                    generation = generation.id.0,
                    "discarding settlement of an aborted generation"
                ),
            }
        });
    }
}

impl<T, D> Default for QueryController<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, D> Drop for QueryController<T, D> {
    fn drop(&mut self) {
        self.shared.slot.teardown();
    }
}

impl<T, D> fmt::Debug for QueryController<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryController")
            .field("generation", &self.shared.slot.current_id())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Aborts whichever generation is current when [`AbortHandle::abort`] is called.
///
/// Does nothing once the controller has been dropped.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    slot: Weak<GenerationSlot>,
}

impl AbortHandle {
    pub fn abort(&self) {
        if let Some(slot) = self.slot.upgrade() {
            abort_current(&slot);
        }
    }
}

fn abort_current(slot: &GenerationSlot) {
    let Some(token) = slot.current_token() else {
        return;
    };
    debug!(generation = ?slot.current_id(), "abort requested");
    token.cancel();
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;

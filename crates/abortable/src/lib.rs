//! Abortable async-operation lifecycle controllers.
//!
//! A [`QueryController`] re-runs an operation whenever its dependency snapshot changes and
//! fences off settlements from superseded generations. A [`MutationController`] runs an
//! operation on demand, records the outcome and hands it back to the caller. Both expose
//! their progress as a [`State`] driven by the [`reduce`] transition table.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod cancellation;
mod generation;
pub mod mutation;
pub mod options;
pub mod query;
pub mod reducer;
pub mod timeout;

pub use cancellation::{CallbackKey, CancellationToken};
pub use mutation::MutationController;
pub use options::{MutationOptions, QueryOptions};
pub use query::{AbortHandle, QueryController};
pub use reducer::{reduce, Event, State};
pub use shared::{
    domain::{GenerationId, ResetPolicy, TokenSupport},
    error::{ErrorKind, ErrorReport, OperationError},
};
pub use timeout::{timeout_mutation, timeout_operation, with_timeout};

/// Every critical section in this crate leaves its data consistent, so a poisoned lock is
/// still safe to use.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

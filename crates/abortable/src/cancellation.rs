//! Cooperative cancellation handle shared between a controller and the operation it runs.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex},
};

use shared::domain::TokenSupport;
use tokio::sync::Notify;

use crate::lock;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Identifies a callback registered with [`CancellationToken::on_cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackKey(u64);

enum Registry {
    Active {
        next_key: u64,
        callbacks: Vec<(CallbackKey, Callback)>,
    },
    Cancelled,
}

struct Inner {
    registry: Mutex<Registry>,
    notify: Notify,
}

/// One-way `active -> cancelled` flag with observers.
///
/// Clones share the same flag. Callbacks registered with [`CancellationToken::on_cancel`] run
/// exactly once, synchronously, on the thread that performs the transition. An inert token
/// (see [`TokenSupport::Inert`]) never transitions and drops every callback it is given.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Option<Arc<Inner>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Some(Arc::new(Inner {
                registry: Mutex::new(Registry::Active {
                    next_key: 0,
                    callbacks: Vec::new(),
                }),
                notify: Notify::new(),
            })),
        }
    }

    pub fn inert() -> Self {
        Self { inner: None }
    }

    pub fn for_support(support: TokenSupport) -> Self {
        match support {
            TokenSupport::Native => Self::new(),
            TokenSupport::Inert => Self::inert(),
        }
    }

    pub fn is_inert(&self) -> bool {
        self.inner.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            Some(inner) => matches!(*lock(&inner.registry), Registry::Cancelled),
            None => false,
        }
    }

    /// Requests cancellation. Returns `true` only for the call that performed the transition.
    pub fn cancel(&self) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };

        let callbacks = {
            let mut registry = lock(&inner.registry);
            match std::mem::replace(&mut *registry, Registry::Cancelled) {
                Registry::Active { callbacks, .. } => callbacks,
                Registry::Cancelled => return false,
            }
        };

        inner.notify.notify_waiters();
        for (_, callback) in callbacks {
            callback();
        }
        true
    }

    /// Registers `callback` to run on cancellation. Runs it right away if the token is
    /// already cancelled.
    ///
    /// Returns the key that [`CancellationToken::remove_on_cancel`] takes, or `None` when the
    /// callback was not kept: it already ran, or the token is inert.
    pub fn on_cancel<F>(&self, callback: F) -> Option<CallbackKey>
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = self.inner.as_ref()?;

        {
            let mut registry = lock(&inner.registry);
            if let Registry::Active {
                next_key,
                callbacks,
            } = &mut *registry
            {
                let key = CallbackKey(*next_key);
                *next_key += 1;
                callbacks.push((key, Box::new(callback)));
                return Some(key);
            }
        }

        callback();
        None
    }

    /// Drops a registered callback without running it. Returns `false` when it is no longer
    /// registered.
    pub fn remove_on_cancel(&self, key: CallbackKey) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };

        let removed = {
            let mut registry = lock(&inner.registry);
            let Registry::Active { callbacks, .. } = &mut *registry else {
                return false;
            };
            callbacks
                .iter()
                .position(|(registered, _)| *registered == key)
                .map(|index| callbacks.swap_remove(index))
        };
        removed.is_some()
    }

    #[cfg(test)]
    pub(crate) fn registered_callbacks(&self) -> usize {
        match self.inner.as_ref().map(|inner| lock(&inner.registry)) {
            Some(registry) => match &*registry {
                Registry::Active { callbacks, .. } => callbacks.len(),
                Registry::Cancelled => 0,
            },
            None => 0,
        }
    }

    /// Completes once the token is cancelled. Never completes for an inert token.
    pub async fn cancelled(&self) {
        let Some(inner) = &self.inner else {
            return futures::future::pending().await;
        };

        loop {
            let notified = inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Drives `future` until it completes or the token is cancelled, whichever comes first.
    pub async fn run_until_cancelled<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("inert", &self.is_inert())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/cancellation_tests.rs"]
mod tests;

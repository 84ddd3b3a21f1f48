use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use shared::domain::GenerationId;

use crate::{
    cancellation::{CallbackKey, CancellationToken},
    lock,
};

/// One run of a query operation.
#[derive(Debug)]
pub(crate) struct Generation {
    pub(crate) id: GenerationId,
    pub(crate) token: CancellationToken,
    settled: AtomicBool,
    on_cancel: Mutex<Option<CallbackKey>>,
}

impl Generation {
    pub(crate) fn new(id: GenerationId, token: CancellationToken) -> Self {
        Self {
            id,
            token,
            settled: AtomicBool::new(false),
            on_cancel: Mutex::new(None),
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Registers this generation's cancellation callback on its token. The callback stays
    /// registered until the generation settles or is retired.
    pub(crate) fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) {
        let key = self.token.on_cancel(callback);
        *lock(&self.on_cancel) = key;
    }

    fn release_callback(&self) {
        let key = lock(&self.on_cancel).take();
        if let Some(key) = key {
            self.token.remove_on_cancel(key);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settlement {
    Applied,
    Stale,
    AlreadySettled,
}

/// Holds the current generation of a query controller.
///
/// All state writes for a generation go through [`GenerationSlot::settle`] or
/// [`GenerationSlot::install`], which run under the slot's lock so that a superseded
/// generation can never write after its successor emitted its first event.
#[derive(Debug, Default)]
pub(crate) struct GenerationSlot {
    current: Mutex<Option<Arc<Generation>>>,
}

impl GenerationSlot {
    pub(crate) fn install(&self, generation: Arc<Generation>, on_install: impl FnOnce()) {
        let mut current = lock(&self.current);
        *current = Some(generation);
        on_install();
    }

    /// Detaches the current generation. Its pending settlement becomes stale.
    fn retire(&self) -> Option<Arc<Generation>> {
        lock(&self.current).take()
    }

    pub(crate) fn current_id(&self) -> Option<GenerationId> {
        lock(&self.current).as_ref().map(|generation| generation.id)
    }

    pub(crate) fn current_token(&self) -> Option<CancellationToken> {
        lock(&self.current)
            .as_ref()
            .map(|generation| generation.token.clone())
    }

    /// Runs `apply` if `generation` is still current and has not settled yet.
    pub(crate) fn settle(&self, generation: &Generation, apply: impl FnOnce()) -> Settlement {
        {
            let current = lock(&self.current);
            let is_current = current
                .as_ref()
                .is_some_and(|current| current.id == generation.id);
            if !is_current {
                return Settlement::Stale;
            }
            if generation.settled.swap(true, Ordering::AcqRel) {
                return Settlement::AlreadySettled;
            }
            apply();
        }
        generation.release_callback();
        Settlement::Applied
    }

    /// Retires the current generation ahead of its successor. Its token is cancelled only if
    /// it never settled.
    pub(crate) fn supersede(&self) -> Option<GenerationId> {
        let generation = self.retire()?;
        generation.release_callback();
        if !generation.is_settled() {
            generation.token.cancel();
        }
        Some(generation.id)
    }

    /// Retires the current generation and cancels its token.
    pub(crate) fn teardown(&self) -> Option<GenerationId> {
        let generation = self.retire()?;
        generation.release_callback();
        generation.token.cancel();
        Some(generation.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation(id: u64) -> Arc<Generation> {
        Arc::new(Generation::new(GenerationId(id), CancellationToken::new()))
    }

    #[test]
    fn settles_current_generation_once() {
        let slot = GenerationSlot::default();
        let first = generation(1);
        slot.install(Arc::clone(&first), || {});

        let mut applied = 0;
        assert_eq!(slot.settle(&first, || applied += 1), Settlement::Applied);
        assert_eq!(
            slot.settle(&first, || applied += 1),
            Settlement::AlreadySettled
        );
        assert_eq!(applied, 1);
        assert!(first.is_settled());
    }

    #[test]
    fn superseded_generation_is_stale() {
        let slot = GenerationSlot::default();
        let first = generation(1);
        let second = generation(2);
        slot.install(Arc::clone(&first), || {});
        slot.install(Arc::clone(&second), || {});

        assert_eq!(slot.settle(&first, || {}), Settlement::Stale);
        assert_eq!(slot.current_id(), Some(GenerationId(2)));
    }

    #[test]
    fn supersede_cancels_only_unsettled_generations() {
        let slot = GenerationSlot::default();
        let pending = generation(1);
        slot.install(Arc::clone(&pending), || {});
        assert_eq!(slot.supersede(), Some(GenerationId(1)));
        assert!(pending.token.is_cancelled());
        assert_eq!(slot.settle(&pending, || {}), Settlement::Stale);

        let settled = generation(2);
        slot.install(Arc::clone(&settled), || {});
        slot.settle(&settled, || {});
        slot.supersede();
        assert!(!settled.token.is_cancelled());
        assert_eq!(slot.supersede(), None);
    }

    #[test]
    fn teardown_cancels_settled_generations_too() {
        let slot = GenerationSlot::default();
        let settled = generation(1);
        slot.install(Arc::clone(&settled), || {});
        slot.settle(&settled, || {});

        assert_eq!(slot.teardown(), Some(GenerationId(1)));
        assert!(settled.token.is_cancelled());
        assert_eq!(slot.teardown(), None);
    }

    #[test]
    fn callback_is_released_once_the_generation_settles() {
        let slot = GenerationSlot::default();
        let first = generation(1);
        first.on_cancel(|| {});
        slot.install(Arc::clone(&first), || {});
        assert_eq!(first.token.registered_callbacks(), 1);

        slot.settle(&first, || {});
        assert_eq!(first.token.registered_callbacks(), 0);
        assert!(!first.token.is_cancelled());
    }
}

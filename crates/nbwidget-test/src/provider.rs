//! State providers for tests.

use futures_util::future::{FutureExt, LocalBoxFuture};
use nbwidget_core::{ModelId, ModelState, ProviderError};
use nbwidget_manager::{NotebookStateProvider, StateProvider};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use tokio::sync::watch;

/// In-memory provider that counts lookups.
///
/// Clones share the same entries and counters, so a test can keep one clone
/// after handing another to a manager.
#[derive(Clone, Default)]
pub struct FakeState {
    notebook: Rc<RefCell<NotebookStateProvider>>,
    raw: Rc<RefCell<BTreeMap<ModelId, ModelState>>>,
    failures: Rc<RefCell<BTreeMap<ModelId, String>>>,
    lookups: Rc<Cell<usize>>,
    yields: usize,
}

impl FakeState {
    pub fn new(notebook: NotebookStateProvider) -> Self {
        Self {
            notebook: Rc::new(RefCell::new(notebook)),
            ..Self::default()
        }
    }

    /// Yield to the executor `yields` times before answering each lookup.
    #[must_use]
    pub const fn yielding(mut self, yields: usize) -> Self {
        self.yields = yields;
        self
    }

    /// Serve `state` verbatim for `id`, bypassing the notebook format.
    pub fn insert(&self, id: impl Into<ModelId>, state: ModelState) {
        self.raw.borrow_mut().insert(id.into(), state);
    }

    /// Make lookups of `id` fail with [`ProviderError::Failed`].
    pub fn fail(&self, id: impl Into<ModelId>, reason: impl Into<String>) {
        self.failures.borrow_mut().insert(id.into(), reason.into());
    }

    /// Lookups answered so far, successful or not.
    pub fn lookup_count(&self) -> usize {
        self.lookups.get()
    }

    fn answer(&self, model_id: &ModelId) -> Result<ModelState, ProviderError> {
        if let Some(reason) = self.failures.borrow().get(model_id) {
            return Err(ProviderError::Failed(reason.clone()));
        }
        if let Some(state) = self.raw.borrow().get(model_id) {
            return Ok(state.clone());
        }
        self.notebook
            .borrow()
            .get(model_id)
            .cloned()
            .map(ModelState::from)
            .ok_or_else(|| ProviderError::UnknownModel(model_id.clone()))
    }
}

impl StateProvider for FakeState {
    fn get_model_state<'a>(
        &'a self,
        model_id: &'a ModelId,
    ) -> LocalBoxFuture<'a, Result<ModelState, ProviderError>> {
        self.lookups.set(self.lookups.get() + 1);
        async move {
            for _ in 0..self.yields {
                tokio::task::yield_now().await;
            }
            self.answer(model_id)
        }
        .boxed_local()
    }
}

/// Opens a [`GatedState`].
#[derive(Debug)]
pub struct Gate(watch::Sender<bool>);

impl Gate {
    /// Let every pending and future lookup through.
    pub fn open(&self) {
        self.0.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.0.borrow()
    }
}

/// Provider whose lookups stay pending until its [`Gate`] opens.
#[derive(Clone)]
pub struct GatedState {
    inner: FakeState,
    gate: watch::Receiver<bool>,
}

impl GatedState {
    pub fn new(inner: FakeState) -> (Self, Gate) {
        let (tx, rx) = watch::channel(false);
        (Self { inner, gate: rx }, Gate(tx))
    }

    pub const fn inner(&self) -> &FakeState {
        &self.inner
    }
}

impl StateProvider for GatedState {
    fn get_model_state<'a>(
        &'a self,
        model_id: &'a ModelId,
    ) -> LocalBoxFuture<'a, Result<ModelState, ProviderError>> {
        let mut gate = self.gate.clone();
        async move {
            gate.wait_for(|open| *open)
                .await
                .map(|_| ())
                .map_err(|_| ProviderError::Failed("gate dropped before opening".to_string()))?;
            self.inner.get_model_state(model_id).await
        }
        .boxed_local()
    }
}

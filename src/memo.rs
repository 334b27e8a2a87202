//! Memoized selectors.

use std::any::Any;
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::context::SelectionContext;
use crate::error::SelectError;
use crate::identical::Identical;
use crate::key::{Label, SelectorKey};
use crate::query::{Dependencies, Query};
use crate::selector::Selector;
use crate::wrapper::{AnySelector, Computation, Invocation};

/// Shared selection logic of a memoized selector.
pub type SelectionLogic<S, R> = Rc<dyn Fn(&Query<'_, S>) -> Result<R, SelectError>>;

/// Snapshot of a selector's last successful computation.
///
/// A snapshot is never modified after it is stored. Revalidation only reads
/// it, and a recomputation replaces it with a new one.
pub struct CachedResult<S, R> {
    state_version: u64,
    dependencies: Dependencies<S>,
    value: R,
}

impl<S: 'static, R> CachedResult<S, R> {
    /// The context's state version at the time of the computation.
    pub fn state_version(&self) -> u64 {
        self.state_version
    }

    /// The memoized value.
    pub fn value(&self) -> &R {
        &self.value
    }

    /// Dependencies in the order they were first queried.
    pub fn dependencies(&self) -> impl Iterator<Item = &SelectorKey> + '_ {
        self.dependencies.keys()
    }

    /// Number of recorded dependencies.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    /// The value a dependency returned during the computation.
    ///
    /// Returns `None` if `key` is not a dependency or `T` is not its output
    /// type.
    pub fn dependency_value<T: 'static>(&self, key: &SelectorKey) -> Option<&T> {
        self.dependencies.get::<T>(key)
    }
}

impl<S: 'static, R: fmt::Debug> fmt::Debug for CachedResult<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedResult")
            .field("state_version", &self.state_version)
            .field("dependencies", &self.dependencies.keys().collect::<Vec<_>>())
            .field("value", &self.value)
            .finish()
    }
}

struct SelectorInner<S, R> {
    context: SelectionContext<S>,
    logic: SelectionLogic<S, R>,
    label: RefCell<Label>,
    recomputations: Cell<u64>,
    cached: RefCell<Option<Rc<CachedResult<S, R>>>>,
}

/// A selector that caches its result and recomputes only when one of the
/// dependencies it read last time returns something different.
///
/// Created by [`SelectionContext::make_selector`]. Cloning is cheap and the
/// clone is the same selector: same cache, same identity.
///
/// # Evaluation
///
/// For a call with state `s`:
///
/// 1. If `s` is not the state the context saw last, the context version
///    is bumped.
/// 2. If the cache was computed at the current version, it is returned.
/// 3. Otherwise the recorded dependencies are re-selected in the order they
///    were first queried. If none returns a different value, the cache is
///    returned as-is.
/// 4. Otherwise the selection logic runs again with a fresh [`Query`], and
///    what it queries becomes the new dependency snapshot.
pub struct MemoizedSelector<S, R> {
    inner: Rc<SelectorInner<S, R>>,
}

impl<S, R> Clone for MemoizedSelector<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: 'static, R: Clone + Identical + 'static> MemoizedSelector<S, R> {
    pub(crate) fn new(
        context: SelectionContext<S>,
        logic: SelectionLogic<S, R>,
        label: &'static str,
    ) -> Self {
        Self {
            inner: Rc::new(SelectorInner {
                context,
                logic,
                label: RefCell::new(Label::Static(label)),
                recomputations: Cell::new(0),
                cached: RefCell::new(None),
            }),
        }
    }

    /// Set the label used in diagnostics and log output.
    pub fn named(self, label: impl Into<Cow<'static, str>>) -> Self {
        *self.inner.label.borrow_mut() = Label::from(label.into());
        self
    }

    /// The label used in diagnostics.
    pub fn label(&self) -> String {
        self.inner.label.borrow().to_string()
    }

    /// Identity of this selector.
    pub fn key(&self) -> SelectorKey {
        SelectorKey::labeled(Rc::as_ptr(&self.inner), self.inner.label.borrow().clone())
    }

    /// The context this selector belongs to.
    pub fn context(&self) -> &SelectionContext<S> {
        &self.inner.context
    }

    /// The selection logic, for building derived selectors.
    pub fn selection_logic(&self) -> SelectionLogic<S, R> {
        self.inner.logic.clone()
    }

    /// Number of times the selection logic has run since creation or the
    /// last reset.
    pub fn recomputations(&self) -> u64 {
        self.inner.recomputations.get()
    }

    /// Reset the recomputation counter. Returns the new value, zero.
    pub fn reset_recomputations(&self) -> u64 {
        self.inner.recomputations.set(0);
        0
    }

    /// The last successful computation, if any. Never triggers computation.
    pub fn introspect(&self) -> Option<Rc<CachedResult<S, R>>> {
        self.inner.cached.borrow().clone()
    }

    /// Select the derived value from `state`.
    ///
    /// Goes through the context's invocation wrapper when one is installed.
    pub fn select(&self, state: &Arc<S>) -> Result<R, SelectError> {
        let Some(wrapper) = self.inner.context.invocation_wrapper() else {
            return self.evaluate(state);
        };

        let mut value = None;
        let mut run = || -> Result<(), SelectError> {
            value = Some(self.evaluate(state)?);
            Ok(())
        };
        wrapper(Invocation::new(self, state, &mut run)).into_outcome()?;
        Ok(value.expect("a proceeded invocation always stores its value"))
    }

    fn evaluate(&self, state: &Arc<S>) -> Result<R, SelectError> {
        let inner = &*self.inner;
        let version = inner.context.observe(state);

        let cached = inner.cached.borrow().clone();
        if let Some(cached) = &cached {
            if cached.state_version == version {
                tracing::trace!(selector = %inner.label.borrow(), version, "cache hit");
                return Ok(cached.value.clone());
            }
        }

        let key = self.key();
        let _evaluating = inner.context.enter(&key)?;

        let reason = match &cached {
            None => None,
            Some(cached) => match cached.dependencies.first_changed(state)? {
                Some(changed) => Some(changed.clone()),
                None => {
                    tracing::trace!(selector = %key, version, "dependencies unchanged");
                    return Ok(cached.value.clone());
                }
            },
        };
        drop(cached);

        self.recompute(state, version, reason, &key)
    }

    fn recompute(
        &self,
        state: &Arc<S>,
        version: u64,
        reason: Option<SelectorKey>,
        key: &SelectorKey,
    ) -> Result<R, SelectError> {
        let inner = &*self.inner;
        let recomputations = inner.recomputations.get() + 1;
        inner.recomputations.set(recomputations);
        tracing::debug!(
            selector = %key,
            version,
            recomputations,
            reason = reason.as_ref().map(|k| k.label()),
            "recomputing selector"
        );

        let query = Query::new(state, reason);
        let value = match inner.context.computation_wrapper() {
            None => (inner.logic)(&query)?,
            Some(wrapper) => {
                let mut value = None;
                let mut run = || -> Result<(), SelectError> {
                    value = Some((inner.logic)(&query)?);
                    Ok(())
                };
                wrapper(Computation::new(self, state, query.reason(), &mut run)).into_outcome()?;
                value.expect("a proceeded computation always stores its value")
            }
        };

        let dependencies = query.into_dependencies();
        if dependencies.is_empty() {
            tracing::warn!(selector = %key, "selection logic did not query any selector");
            return Err(SelectError::NoDependencies {
                selector: key.label().to_string(),
            });
        }

        *inner.cached.borrow_mut() = Some(Rc::new(CachedResult {
            state_version: version,
            dependencies,
            value: value.clone(),
        }));
        Ok(value)
    }
}

impl<S: 'static, R: Clone + Identical + 'static> Selector<S> for MemoizedSelector<S, R> {
    type Output = R;

    #[inline]
    fn select(&self, state: &Arc<S>) -> Result<R, SelectError> {
        MemoizedSelector::select(self, state)
    }

    #[inline]
    fn key(&self) -> SelectorKey {
        MemoizedSelector::key(self)
    }
}

impl<S: 'static, R: Clone + Identical + 'static> AnySelector for MemoizedSelector<S, R> {
    fn key(&self) -> SelectorKey {
        MemoizedSelector::key(self)
    }

    fn recomputations(&self) -> u64 {
        MemoizedSelector::recomputations(self)
    }

    fn reset_recomputations(&self) -> u64 {
        MemoizedSelector::reset_recomputations(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<S, R> fmt::Debug for MemoizedSelector<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoizedSelector")
            .field("label", &self.inner.label.borrow().as_str())
            .field("recomputations", &self.inner.recomputations.get())
            .finish_non_exhaustive()
    }
}

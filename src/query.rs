//! Dependency tracing for one selection-logic pass.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::SelectError;
use crate::identical::Identical;
use crate::key::SelectorKey;
use crate::selector::Selector;

/// A dependency recorded during a computation: the selector itself and the
/// value it returned.
trait Dependency<S> {
    fn key(&self) -> &SelectorKey;

    fn value(&self) -> &dyn Any;

    /// Re-select the dependency and report whether its output differs from
    /// the recorded one.
    fn has_changed(&self, state: &Arc<S>) -> Result<bool, SelectError>;
}

struct Recorded<S, Sel: Selector<S>> {
    key: SelectorKey,
    selector: Sel,
    value: Sel::Output,
    _state: PhantomData<fn(&S)>,
}

impl<S, Sel: Selector<S>> Dependency<S> for Recorded<S, Sel> {
    fn key(&self) -> &SelectorKey {
        &self.key
    }

    fn value(&self) -> &dyn Any {
        &self.value
    }

    fn has_changed(&self, state: &Arc<S>) -> Result<bool, SelectError> {
        let fresh = self.selector.select(state)?;
        Ok(!fresh.identical(&self.value))
    }
}

/// Ordered set of dependencies, in the order they were first queried.
pub(crate) struct Dependencies<S> {
    entries: Vec<Box<dyn Dependency<S>>>,
    index: HashMap<SelectorKey, usize, ahash::RandomState>,
}

impl<S: 'static> Dependencies<S> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &SelectorKey> + '_ {
        self.entries.iter().map(|entry| entry.key())
    }

    pub(crate) fn get<T: 'static>(&self, key: &SelectorKey) -> Option<&T> {
        let position = *self.index.get(key)?;
        self.entries[position].value().downcast_ref::<T>()
    }

    fn record<Sel: Selector<S>>(&mut self, key: SelectorKey, selector: Sel, value: Sel::Output) {
        if self.index.contains_key(&key) {
            return;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push(Box::new(Recorded {
            key,
            selector,
            value,
            _state: PhantomData,
        }));
    }

    /// Revalidate every dependency in insertion order and return the first
    /// one whose output changed.
    pub(crate) fn first_changed(&self, state: &Arc<S>) -> Result<Option<&SelectorKey>, SelectError> {
        for entry in &self.entries {
            if entry.has_changed(state)? {
                return Ok(Some(entry.key()));
            }
        }
        Ok(None)
    }
}

/// Query handle passed to selection logic.
///
/// Every selector consulted through the query becomes a dependency of the
/// selector being computed. Querying the same selector twice in one pass
/// runs it once and returns the remembered value the second time.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use selector_flow::{Query, SelectionContext};
///
/// struct Counter {
///     a: i32,
///     b: i32,
/// }
///
/// let context = SelectionContext::<Counter>::new();
/// let sum = context.make_selector(|q: &Query<'_, Counter>| {
///     Ok(q.read(|s| s.a) + q.read(|s| s.b))
/// });
///
/// assert_eq!(sum.select(&Arc::new(Counter { a: 1, b: 2 })).unwrap(), 3);
/// ```
pub struct Query<'a, S> {
    state: &'a Arc<S>,
    reason: Option<SelectorKey>,
    dependencies: RefCell<Dependencies<S>>,
}

impl<'a, S: 'static> Query<'a, S> {
    pub(crate) fn new(state: &'a Arc<S>, reason: Option<SelectorKey>) -> Self {
        Self {
            state,
            reason,
            dependencies: RefCell::new(Dependencies::new()),
        }
    }

    /// Query a selector, recording it as a dependency.
    ///
    /// Errors from the selector are returned as-is and nothing is recorded.
    pub fn query<Sel: Selector<S>>(&self, selector: &Sel) -> Result<Sel::Output, SelectError> {
        let key = selector.key();
        let remembered = self.dependencies.borrow().get::<Sel::Output>(&key).cloned();
        if let Some(value) = remembered {
            return Ok(value);
        }

        let value = selector.select(self.state)?;
        tracing::trace!(dependency = %key, "dependency recorded");
        self.dependencies
            .borrow_mut()
            .record(key, selector.clone(), value.clone());
        Ok(value)
    }

    /// Read a part of the state through a plain reader function, recording it
    /// as a dependency.
    ///
    /// Non-capturing closures coerce to the reader type, so
    /// `q.read(|s| s.count)` works directly. The same closure expression
    /// always has the same identity.
    pub fn read<R>(&self, reader: fn(&S) -> R) -> R
    where
        R: Clone + Identical + 'static,
    {
        let key = SelectorKey::new(reader as usize, type_name::<fn(&S) -> R>());
        let remembered = self.dependencies.borrow().get::<R>(&key).cloned();
        if let Some(value) = remembered {
            return value;
        }

        let value = reader(&**self.state);
        self.dependencies
            .borrow_mut()
            .record(key, reader, value.clone());
        value
    }

    /// The dependency whose change caused this recomputation.
    ///
    /// `None` on the first computation of a selector.
    pub fn reason(&self) -> Option<&SelectorKey> {
        self.reason.as_ref()
    }

    /// Returns `true` if `selector` is the dependency that caused this
    /// recomputation.
    pub fn is_reason<Sel: Selector<S>>(&self, selector: &Sel) -> bool {
        self.reason
            .as_ref()
            .is_some_and(|reason| *reason == selector.key())
    }

    /// Number of distinct selectors queried so far in this pass.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.borrow().len()
    }

    pub(crate) fn into_dependencies(self) -> Dependencies<S> {
        self.dependencies.into_inner()
    }
}

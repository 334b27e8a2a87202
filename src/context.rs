//! Selection context: the shared memoization scope.

use std::any::{type_name, Any, TypeId};
use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::SelectError;
use crate::identical::Identical;
use crate::key::SelectorKey;
use crate::memo::{MemoizedSelector, SelectionLogic};
use crate::query::Query;
use crate::wrapper::{
    Computation, ComputationWrapper, Invocation, InvocationWrapper, Proceeded,
};

/// Configuration of a [`SelectionContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Name used in log output.
    pub name: Cow<'static, str>,
    /// Report re-entrant evaluation as [`SelectError::Cycle`] instead of
    /// recursing until the stack overflows.
    pub detect_cycles: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed("selection"),
            detect_cycles: true,
        }
    }
}

/// Builder for a [`SelectionContext`].
///
/// # Example
///
/// ```
/// use selector_flow::SelectionContext;
///
/// let context = SelectionContext::<Vec<u32>>::builder()
///     .name("inventory")
///     .detect_cycles(false)
///     .build::<Vec<u32>>();
/// assert_eq!(context.config().name, "inventory");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name used in log output.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Enable or disable cycle detection. Enabled by default.
    ///
    /// With detection disabled, a cyclic selector graph recurses without
    /// bound; building an acyclic graph is then entirely up to the caller.
    pub fn detect_cycles(mut self, enabled: bool) -> Self {
        self.config.detect_cycles = enabled;
        self
    }

    /// Build the context.
    pub fn build<S: 'static>(self) -> SelectionContext<S> {
        SelectionContext::with_config(self.config)
    }
}

struct ContextInner<S> {
    config: ContextConfig,
    latest: RefCell<Option<Arc<S>>>,
    version: Cell<u64>,
    invocation_wrapper: RefCell<Option<InvocationWrapper<S>>>,
    computation_wrapper: RefCell<Option<ComputationWrapper<S>>>,
    evaluating: RefCell<Vec<SelectorKey>>,
}

/// A memoization scope shared by a family of selectors.
///
/// The context remembers the last state it has seen and a version number
/// that increases each time a different state reference is observed, by any
/// of its selectors. A selector whose cache was computed at the current
/// version returns it without looking at its dependencies at all.
///
/// State is compared by identity ([`Arc::ptr_eq`]), never structurally.
/// Updates must be persistent: unchanged parts of the state keep their
/// `Arc`, so that dependency revalidation can tell them apart from the
/// parts that changed.
///
/// This is cheap to clone; clones share the same scope.
pub struct SelectionContext<S> {
    inner: Rc<ContextInner<S>>,
}

impl<S> Clone for SelectionContext<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: 'static> Default for SelectionContext<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> SelectionContext<S> {
    /// Create a new isolated context with default settings.
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    /// Create a builder for customizing the context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Create a context from a configuration.
    pub fn with_config(config: ContextConfig) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                config,
                latest: RefCell::new(None),
                version: Cell::new(0),
                invocation_wrapper: RefCell::new(None),
                computation_wrapper: RefCell::new(None),
                evaluating: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The configuration this context was built with.
    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    /// Current state version. Zero until the first state is observed.
    pub fn state_version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Create a memoized selector from a selection logic.
    ///
    /// The selection logic reads the state only through the [`Query`] it is
    /// given; every selector it queries becomes a dependency.
    pub fn make_selector<R, F>(&self, selection_logic: F) -> MemoizedSelector<S, R>
    where
        R: Clone + Identical + 'static,
        F: Fn(&Query<'_, S>) -> Result<R, SelectError> + 'static,
    {
        MemoizedSelector::new(self.clone(), Rc::new(selection_logic), type_name::<F>())
    }

    /// Create a memoized selector from an already shared selection logic,
    /// for example the one of another selector. The new selector has its own
    /// cache.
    pub fn make_selector_from<R>(&self, selection_logic: SelectionLogic<S, R>) -> MemoizedSelector<S, R>
    where
        R: Clone + Identical + 'static,
    {
        MemoizedSelector::new(self.clone(), selection_logic, type_name::<R>())
    }

    /// Install the invocation wrapper, replacing any previous one.
    pub fn set_invocation_wrapper<F>(&self, wrapper: F)
    where
        F: for<'a> Fn(Invocation<'a, S>) -> Proceeded<'a> + 'static,
    {
        *self.inner.invocation_wrapper.borrow_mut() = Some(Rc::new(wrapper));
    }

    /// Remove the invocation wrapper.
    pub fn clear_invocation_wrapper(&self) {
        self.inner.invocation_wrapper.borrow_mut().take();
    }

    /// Install the computation wrapper, replacing any previous one.
    pub fn set_computation_wrapper<F>(&self, wrapper: F)
    where
        F: for<'a> Fn(Computation<'a, S>) -> Proceeded<'a> + 'static,
    {
        *self.inner.computation_wrapper.borrow_mut() = Some(Rc::new(wrapper));
    }

    /// Remove the computation wrapper.
    pub fn clear_computation_wrapper(&self) {
        self.inner.computation_wrapper.borrow_mut().take();
    }

    pub(crate) fn invocation_wrapper(&self) -> Option<InvocationWrapper<S>> {
        self.inner.invocation_wrapper.borrow().clone()
    }

    pub(crate) fn computation_wrapper(&self) -> Option<ComputationWrapper<S>> {
        self.inner.computation_wrapper.borrow().clone()
    }

    /// Record `state` as the latest state and return the current version.
    pub(crate) fn observe(&self, state: &Arc<S>) -> u64 {
        let mut latest = self.inner.latest.borrow_mut();
        let unchanged = latest
            .as_ref()
            .is_some_and(|seen| Arc::ptr_eq(seen, state));
        if !unchanged {
            *latest = Some(state.clone());
            let version = self.inner.version.get() + 1;
            self.inner.version.set(version);
            tracing::trace!(context = %self.inner.config.name, version, "new state observed");
        }
        self.inner.version.get()
    }

    /// Mark `key` as being evaluated until the returned guard is dropped.
    pub(crate) fn enter(&self, key: &SelectorKey) -> Result<Evaluating<'_, S>, SelectError> {
        if !self.inner.config.detect_cycles {
            return Ok(Evaluating { context: None });
        }

        let mut evaluating = self.inner.evaluating.borrow_mut();
        if evaluating.contains(key) {
            let mut path: Vec<String> = evaluating.iter().map(|k| k.label().to_string()).collect();
            path.push(key.label().to_string());
            tracing::warn!(context = %self.inner.config.name, path = ?path, "selector cycle detected");
            return Err(SelectError::Cycle { path });
        }
        evaluating.push(key.clone());
        Ok(Evaluating {
            context: Some(&self.inner),
        })
    }
}

/// Guard popping the evaluation stack on drop.
pub(crate) struct Evaluating<'a, S> {
    context: Option<&'a ContextInner<S>>,
}

impl<S> Drop for Evaluating<'_, S> {
    fn drop(&mut self) {
        if let Some(context) = self.context {
            context.evaluating.borrow_mut().pop();
        }
    }
}

/// Create a new isolated selection context.
pub fn create_selection_context<S: 'static>() -> SelectionContext<S> {
    SelectionContext::new()
}

// One implicit context per state type, per thread.
thread_local! {
    static DEFAULT_CONTEXTS: RefCell<HashMap<TypeId, Box<dyn Any>, ahash::RandomState>> =
        RefCell::new(HashMap::with_hasher(ahash::RandomState::new()));
}

/// The implicit default context for state type `S`.
///
/// Every caller on the same thread that uses the default context with the
/// same state type shares one scope.
pub fn default_context<S: 'static>() -> SelectionContext<S> {
    DEFAULT_CONTEXTS.with(|contexts| {
        let mut contexts = contexts.borrow_mut();
        let type_id = TypeId::of::<S>();
        if let Some(context) = contexts
            .get(&type_id)
            .and_then(|context| context.downcast_ref::<SelectionContext<S>>())
        {
            return context.clone();
        }

        let context = SelectionContext::<S>::builder().name("default").build();
        contexts.insert(type_id, Box::new(context.clone()));
        context
    })
}

/// Create a memoized selector in the default context for `S`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use selector_flow::{make_selector, Query};
///
/// struct Cart {
///     prices: Vec<u32>,
/// }
///
/// let total = make_selector(|q: &Query<'_, Cart>| {
///     Ok(q.read(|c| c.prices.clone()).iter().sum::<u32>())
/// });
/// assert_eq!(total.select(&Arc::new(Cart { prices: vec![2, 3] })).unwrap(), 5);
/// ```
pub fn make_selector<S, R, F>(selection_logic: F) -> MemoizedSelector<S, R>
where
    S: 'static,
    R: Clone + Identical + 'static,
    F: Fn(&Query<'_, S>) -> Result<R, SelectError> + 'static,
{
    default_context::<S>().make_selector(selection_logic)
}

//! The selector capability and its built-in implementations.

use std::any::type_name;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::SelectError;
use crate::identical::Identical;
use crate::key::SelectorKey;

/// A selector derives a value from the state.
///
/// A selector is a capability, not a class: plain reader functions, shared
/// closures ([`FnSelector`]), memoized selectors and [`SelectState`] all
/// implement it, and any of them can be queried as a dependency.
///
/// Cloning a selector must keep its identity: the clone has to return the
/// same [`key`](Selector::key), because dependency snapshots keep a clone
/// around to revalidate it later.
pub trait Selector<S>: Clone + 'static {
    /// The derived value.
    type Output: Clone + Identical + 'static;

    /// Select the output from `state`.
    fn select(&self, state: &Arc<S>) -> Result<Self::Output, SelectError>;

    /// Identity of this selector.
    fn key(&self) -> SelectorKey;
}

impl<S: 'static, R: Clone + Identical + 'static> Selector<S> for fn(&S) -> R {
    type Output = R;

    #[inline]
    fn select(&self, state: &Arc<S>) -> Result<R, SelectError> {
        Ok(self(&**state))
    }

    #[inline]
    fn key(&self) -> SelectorKey {
        SelectorKey::new(*self as usize, type_name::<Self>())
    }
}

/// A selector backed by a shared closure.
///
/// Use this for readers that capture data, for example a per-id lookup.
/// Identity is the closure allocation: clones are the same selector, two
/// separately built `FnSelector`s never are, even if the closures are
/// structurally identical.
pub struct FnSelector<S, R> {
    f: Rc<dyn Fn(&S) -> R>,
    label: &'static str,
}

impl<S, R> Clone for FnSelector<S, R> {
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            label: self.label,
        }
    }
}

impl<S, R> FnSelector<S, R> {
    /// Wrap a closure as a selector.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&S) -> R + 'static,
    {
        Self {
            f: Rc::new(f),
            label: type_name::<F>(),
        }
    }

    /// Replace the label used in diagnostics.
    pub fn named(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }
}

impl<S: 'static, R: Clone + Identical + 'static> Selector<S> for FnSelector<S, R> {
    type Output = R;

    #[inline]
    fn select(&self, state: &Arc<S>) -> Result<R, SelectError> {
        Ok((self.f)(&**state))
    }

    fn key(&self) -> SelectorKey {
        SelectorKey::of_ptr(Rc::as_ptr(&self.f), self.label)
    }
}

/// Build a [`FnSelector`] from a closure.
pub fn selector_fn<S, R, F>(f: F) -> FnSelector<S, R>
where
    F: Fn(&S) -> R + 'static,
{
    FnSelector::new(f)
}

/// Selector returning the whole state.
///
/// This is the base case for composing derived selectors over the entire
/// state value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectState;

static SELECT_STATE_ID: u8 = 0;

impl<S: 'static> Selector<S> for SelectState {
    type Output = Arc<S>;

    #[inline]
    fn select(&self, state: &Arc<S>) -> Result<Arc<S>, SelectError> {
        Ok(state.clone())
    }

    fn key(&self) -> SelectorKey {
        SelectorKey::of_ptr(&SELECT_STATE_ID as *const u8, "select_state")
    }
}

/// Identity passthrough: returns the state itself.
#[inline]
pub fn select_state<S>(state: &Arc<S>) -> Arc<S> {
    state.clone()
}

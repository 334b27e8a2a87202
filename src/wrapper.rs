//! Interception hooks for selector invocations and computations.
//!
//! A context holds at most one invocation wrapper and one computation
//! wrapper. Installing a wrapper replaces the previous one; wrappers are never
//! stacked. To combine several, write one wrapper that does both.
//!
//! A wrapper receives an [`Invocation`] or [`Computation`] handle and must
//! return the [`Proceeded`] token obtained from `proceed()`. The token can
//! only be produced by proceeding, so a wrapper cannot skip the evaluation
//! or replace the value the selector computes; it can only observe it.
//!
//! A token is bound to the evaluation that produced it, so one kept from an
//! earlier call cannot be returned instead:
//!
//! ```compile_fail
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use selector_flow::{Proceeded, SelectionContext};
//!
//! let context = SelectionContext::<u32>::new();
//! let stash: Rc<RefCell<Option<Proceeded<'static>>>> = Rc::new(RefCell::new(None));
//! context.set_invocation_wrapper(move |_invocation| stash.borrow_mut().take().unwrap());
//! ```
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::sync::Arc;
//! use selector_flow::SelectionContext;
//!
//! struct Doc {
//!     title: &'static str,
//! }
//!
//! let context = SelectionContext::<Doc>::new();
//! let depth = Rc::new(Cell::new(0));
//! let max_depth = Rc::new(Cell::new(0));
//! {
//!     let (depth, max_depth) = (depth.clone(), max_depth.clone());
//!     context.set_invocation_wrapper(move |invocation| {
//!         depth.set(depth.get() + 1);
//!         max_depth.set(max_depth.get().max(depth.get()));
//!         let proceeded = invocation.proceed();
//!         depth.set(depth.get() - 1);
//!         proceeded
//!     });
//! }
//!
//! let title = context.make_selector(|q| Ok(q.read(|d| d.title)));
//! let shout = context.make_selector({
//!     let title = title.clone();
//!     move |q| Ok(q.query(&title)?.to_uppercase())
//! });
//!
//! assert_eq!(shout.select(&Arc::new(Doc { title: "hi" })).unwrap(), "HI");
//! assert_eq!(max_depth.get(), 2);
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::SelectError;
use crate::key::SelectorKey;

/// Type-erased view of a memoized selector, handed to wrappers.
pub trait AnySelector {
    /// Identity of the selector.
    fn key(&self) -> SelectorKey;

    /// Number of recomputations so far.
    fn recomputations(&self) -> u64;

    /// Reset the recomputation counter to zero.
    fn reset_recomputations(&self) -> u64;

    /// Downcast support, e.g. to recover the concrete `MemoizedSelector`.
    fn as_any(&self) -> &dyn Any;
}

/// Invocation wrapper: sees every call of every memoized selector of a
/// context, including calls answered from the cache.
pub type InvocationWrapper<S> = Rc<dyn for<'a> Fn(Invocation<'a, S>) -> Proceeded<'a>>;

/// Computation wrapper: sees every run of a selection logic.
pub type ComputationWrapper<S> = Rc<dyn for<'a> Fn(Computation<'a, S>) -> Proceeded<'a>>;

/// Proof that a wrapper proceeded with the evaluation it was handed.
///
/// Only obtainable from [`Invocation::proceed`] or [`Computation::proceed`].
#[must_use = "a wrapper must return the token it got from proceed()"]
pub struct Proceeded<'a> {
    outcome: Result<(), SelectError>,
    _invariant: PhantomData<fn(&'a ()) -> &'a ()>,
}

impl Proceeded<'_> {
    /// Returns `true` if the evaluation succeeded.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The error the evaluation produced, if any.
    pub fn error(&self) -> Option<&SelectError> {
        self.outcome.as_ref().err()
    }

    pub(crate) fn into_outcome(self) -> Result<(), SelectError> {
        self.outcome
    }
}

/// Runs the evaluation, storing its value on success.
type Run<'a> = &'a mut dyn FnMut() -> Result<(), SelectError>;

fn proceed<'a>(run: Run<'a>) -> Proceeded<'a> {
    Proceeded {
        outcome: run(),
        _invariant: PhantomData,
    }
}

/// One call of a memoized selector, as seen by the invocation wrapper.
pub struct Invocation<'a, S> {
    selector: &'a dyn AnySelector,
    state: &'a Arc<S>,
    run: Run<'a>,
}

impl<'a, S> Invocation<'a, S> {
    pub(crate) fn new(selector: &'a dyn AnySelector, state: &'a Arc<S>, run: Run<'a>) -> Self {
        Self {
            selector,
            state,
            run,
        }
    }

    /// The selector being invoked.
    pub fn selector(&self) -> &'a dyn AnySelector {
        self.selector
    }

    /// The state the selector is invoked with.
    pub fn state(&self) -> &'a Arc<S> {
        self.state
    }

    /// Run the invocation.
    pub fn proceed(self) -> Proceeded<'a> {
        proceed(self.run)
    }
}

/// One run of a selection logic, as seen by the computation wrapper.
pub struct Computation<'a, S> {
    selector: &'a dyn AnySelector,
    state: &'a Arc<S>,
    reason: Option<&'a SelectorKey>,
    run: Run<'a>,
}

impl<'a, S> Computation<'a, S> {
    pub(crate) fn new(
        selector: &'a dyn AnySelector,
        state: &'a Arc<S>,
        reason: Option<&'a SelectorKey>,
        run: Run<'a>,
    ) -> Self {
        Self {
            selector,
            state,
            reason,
            run,
        }
    }

    /// The selector being computed.
    pub fn selector(&self) -> &'a dyn AnySelector {
        self.selector
    }

    /// The state the selector is computed from.
    pub fn state(&self) -> &'a Arc<S> {
        self.state
    }

    /// The dependency whose change caused this computation, `None` on the
    /// first computation.
    pub fn reason(&self) -> Option<&'a SelectorKey> {
        self.reason
    }

    /// Run the selection logic.
    pub fn proceed(self) -> Proceeded<'a> {
        proceed(self.run)
    }
}

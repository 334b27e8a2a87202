//! Selector-Flow: memoized selectors with traced dependencies.
//!
//! A memoized selector derives a value from an immutable state. Instead of
//! declaring its inputs up front, its selection logic reads the state through
//! a [`Query`], and every selector it queries is recorded as a dependency.
//! The next time the selector is called with a new state, it re-selects just
//! those dependencies and recomputes only if one of them returned something
//! different.
//!
//! # Key Features
//!
//! - **Traced dependencies**: the dependency set is whatever the last run
//!   actually read, in the order it read it
//! - **Cheap same-state check**: calling with the same `Arc` as last time is
//!   a version comparison
//! - **Fine-grained revalidation**: a new state that leaves a selector's
//!   inputs untouched does not recompute it
//! - **Composable**: memoized selectors are dependencies of other selectors,
//!   each revalidating independently
//! - **Observable**: single-slot invocation and computation wrappers, with a
//!   ready-made [`EventCollector`] and [`TracingInspector`]
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use selector_flow::SelectionContext;
//!
//! struct Totals {
//!     a: i64,
//!     b: i64,
//! }
//!
//! let context = SelectionContext::<Totals>::new();
//! let sum = context.make_selector(|q| Ok(q.read(|s| s.a) + q.read(|s| s.b)));
//!
//! let state = Arc::new(Totals { a: 1, b: 2 });
//! assert_eq!(sum.select(&state).unwrap(), 3);
//! assert_eq!(sum.select(&state).unwrap(), 3);
//! assert_eq!(sum.recomputations(), 1);
//!
//! let next = Arc::new(Totals { a: 3, b: 2 });
//! assert_eq!(sum.select(&next).unwrap(), 5);
//! assert_eq!(sum.recomputations(), 2);
//! ```
//!
//! # State updates
//!
//! The state and every value a selector returns are compared by identity
//! (see [`Identical`]), never deeply. Update the state persistently: build a
//! new root `Arc` and keep the `Arc`s of every subtree that did not change.
//!
//! # Threading
//!
//! Evaluation is single-threaded and synchronous. Contexts and selectors
//! are `Rc` based and cannot be sent across threads.

#![warn(missing_docs)]

mod context;
mod error;
mod identical;
mod inspector;
mod key;
mod memo;
mod query;
mod selector;
mod wrapper;

pub use context::{
    create_selection_context, default_context, make_selector, ContextBuilder, ContextConfig,
    SelectionContext,
};
pub use error::SelectError;
pub use identical::Identical;
pub use inspector::{EventCollector, SelectorEvent, TracingInspector};
pub use key::SelectorKey;
pub use memo::{CachedResult, MemoizedSelector, SelectionLogic};
pub use query::Query;
pub use selector::{select_state, selector_fn, FnSelector, SelectState, Selector};
pub use wrapper::{
    AnySelector, Computation, ComputationWrapper, Invocation, InvocationWrapper, Proceeded,
};

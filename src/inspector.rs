//! Ready-made wrappers for observing selector evaluation.
//!
//! - [`EventCollector`] records invocations and computations for assertions
//!   in tests or for exporting a trace.
//! - [`TracingInspector`] forwards them to the `tracing` crate, with one span
//!   per invocation so nested dependencies show up as nested spans.
//!
//! Both install themselves as the context's invocation and computation
//! wrappers, replacing whatever was installed before.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::SelectionContext;
use crate::key::SelectorKey;

/// Something that happened during selector evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectorEvent {
    /// A memoized selector was called, whether or not it recomputed.
    Invoked {
        /// The invoked selector.
        selector: SelectorKey,
        /// Whether the call succeeded.
        ok: bool,
    },
    /// A selection logic ran.
    Computed {
        /// The recomputed selector.
        selector: SelectorKey,
        /// The dependency that triggered the recomputation.
        reason: Option<SelectorKey>,
        /// The selector's recomputation count including this run.
        recomputations: u64,
        /// Whether the selection logic succeeded.
        ok: bool,
    },
}

impl SelectorEvent {
    /// The selector the event is about.
    pub fn selector(&self) -> &SelectorKey {
        match self {
            SelectorEvent::Invoked { selector, .. } | SelectorEvent::Computed { selector, .. } => {
                selector
            }
        }
    }
}

/// Event collector - accumulates events in call order.
///
/// An invocation is recorded before the selector runs, so a selector appears
/// before the dependencies it queries.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use std::sync::Arc;
/// use selector_flow::{EventCollector, SelectionContext, SelectorEvent};
///
/// struct Flags {
///     dark_mode: bool,
/// }
///
/// let context = SelectionContext::<Flags>::new();
/// let collector = Rc::new(EventCollector::new());
/// collector.clone().install(&context);
///
/// let dark = context.make_selector(|q| Ok(q.read(|f| f.dark_mode)));
/// dark.select(&Arc::new(Flags { dark_mode: true })).unwrap();
///
/// let events = collector.events();
/// assert!(matches!(events[0], SelectorEvent::Invoked { ok: true, .. }));
/// assert!(matches!(events[1], SelectorEvent::Computed { reason: None, .. }));
/// ```
#[derive(Debug, Default)]
pub struct EventCollector {
    events: RefCell<Vec<SelectorEvent>>,
}

impl EventCollector {
    /// Create a new empty event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the collected events.
    pub fn events(&self) -> Vec<SelectorEvent> {
        self.events.borrow().clone()
    }

    /// Take collected events, clearing the collector.
    pub fn take(&self) -> Vec<SelectorEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Number of recorded invocations.
    pub fn invocation_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, SelectorEvent::Invoked { .. }))
            .count()
    }

    /// Number of recorded computations.
    pub fn computation_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, SelectorEvent::Computed { .. }))
            .count()
    }

    fn push(&self, event: SelectorEvent) -> usize {
        let mut events = self.events.borrow_mut();
        events.push(event);
        events.len() - 1
    }

    fn settle(&self, index: usize, succeeded: bool) {
        if let Some(
            SelectorEvent::Invoked { ok, .. } | SelectorEvent::Computed { ok, .. },
        ) = self.events.borrow_mut().get_mut(index)
        {
            *ok = succeeded;
        }
    }

    /// Install this collector as both wrappers of `context`.
    pub fn install<S: 'static>(self: Rc<Self>, context: &SelectionContext<S>) {
        let collector = self.clone();
        context.set_invocation_wrapper(move |invocation| {
            let index = collector.push(SelectorEvent::Invoked {
                selector: invocation.selector().key(),
                ok: true,
            });
            let proceeded = invocation.proceed();
            collector.settle(index, proceeded.is_ok());
            proceeded
        });

        let collector = self;
        context.set_computation_wrapper(move |computation| {
            let index = collector.push(SelectorEvent::Computed {
                selector: computation.selector().key(),
                reason: computation.reason().cloned(),
                recomputations: computation.selector().recomputations(),
                ok: true,
            });
            let proceeded = computation.proceed();
            collector.settle(index, proceeded.is_ok());
            proceeded
        });
    }
}

/// Forwards selector evaluation to `tracing`.
///
/// Each invocation runs inside a `select` span at debug level; each
/// computation emits a `selection logic started` debug event carrying the
/// reason for it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInspector;

impl TracingInspector {
    /// Install as both wrappers of `context`.
    pub fn install<S: 'static>(self, context: &SelectionContext<S>) {
        let name = context.config().name.clone();
        context.set_invocation_wrapper(move |invocation| {
            let span = tracing::debug_span!(
                "select",
                context = %name,
                selector = %invocation.selector().key()
            );
            let _entered = span.enter();
            let proceeded = invocation.proceed();
            if let Some(error) = proceeded.error() {
                tracing::debug!(%error, "selector failed");
            }
            proceeded
        });

        context.set_computation_wrapper(|computation| {
            tracing::debug!(
                selector = %computation.selector().key(),
                reason = computation.reason().map(|key| key.label()),
                "selection logic started"
            );
            computation.proceed()
        });
    }
}

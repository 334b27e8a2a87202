//! Invocation and computation wrappers, and the bundled inspectors.

use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use selector_flow::{
    EventCollector, MemoizedSelector, SelectError, SelectionContext, SelectorEvent,
    TracingInspector,
};

struct Counter {
    value: i64,
    step: i64,
}

fn counter(value: i64, step: i64) -> Arc<Counter> {
    Arc::new(Counter { value, step })
}

// =============================================================================
// Invocation Wrapper
// =============================================================================

#[test]
fn test_invocation_wrapper_sees_cache_hits() {
    let context = SelectionContext::<Counter>::new();
    let calls = Rc::new(RefCell::new(Vec::new()));
    {
        let calls = calls.clone();
        context.set_invocation_wrapper(move |invocation| {
            calls.borrow_mut().push(invocation.selector().key().label().to_string());
            invocation.proceed()
        });
    }
    let value = context.make_selector(|q| Ok(q.read(|c| c.value))).named("value");

    let state = counter(1, 1);
    value.select(&state).unwrap();
    value.select(&state).unwrap();
    value.select(&counter(1, 2)).unwrap();

    assert_eq!(*calls.borrow(), vec!["value", "value", "value"]);
    assert_eq!(value.recomputations(), 1);
}

#[test]
fn test_invocation_wrapper_reaches_dependencies() {
    let context = SelectionContext::<Counter>::new();
    let seen_states = Rc::new(Cell::new(0));
    let state = counter(2, 3);
    {
        let (seen_states, state) = (seen_states.clone(), state.clone());
        context.set_invocation_wrapper(move |invocation| {
            if Arc::ptr_eq(invocation.state(), &state) {
                seen_states.set(seen_states.get() + 1);
            }
            invocation.proceed()
        });
    }
    let value = context.make_selector(|q| Ok(q.read(|c| c.value)));
    let next = {
        let value = value.clone();
        context.make_selector(move |q| Ok(q.query(&value)? + q.read(|c| c.step)))
    };

    assert_eq!(next.select(&state).unwrap(), 5);
    assert_eq!(seen_states.get(), 2);
}

#[test]
fn test_wrapper_observes_errors() {
    let context = SelectionContext::<Counter>::new();
    let errors = Rc::new(RefCell::new(Vec::new()));
    {
        let errors = errors.clone();
        context.set_invocation_wrapper(move |invocation| {
            let proceeded = invocation.proceed();
            if let Some(error) = proceeded.error() {
                errors.borrow_mut().push(error.to_string());
            }
            proceeded
        });
    }
    let positive = context.make_selector(|q| {
        let value = q.read(|c| c.value);
        if value <= 0 {
            return Err(anyhow::anyhow!("not positive").into());
        }
        Ok(value)
    });

    assert!(positive.select(&counter(-3, 0)).is_err());
    assert_eq!(positive.select(&counter(3, 0)).unwrap(), 3);
    assert_eq!(errors.borrow().len(), 1);
    assert!(errors.borrow()[0].contains("not positive"));
}

#[test]
fn test_wrapper_downcasts_selector() {
    let context = SelectionContext::<Counter>::new();
    let recovered = Rc::new(Cell::new(false));
    {
        let recovered = recovered.clone();
        context.set_invocation_wrapper(move |invocation| {
            let selector = invocation
                .selector()
                .as_any()
                .downcast_ref::<MemoizedSelector<Counter, i64>>();
            recovered.set(selector.is_some());
            invocation.proceed()
        });
    }
    let step = context.make_selector(|q| Ok(q.read(|c| c.step)));

    step.select(&counter(0, 4)).unwrap();
    assert!(recovered.get());
}

// =============================================================================
// Computation Wrapper
// =============================================================================

#[test]
fn test_computation_wrapper_receives_reason() {
    let context = SelectionContext::<Counter>::new();
    let value = context.make_selector(|q| Ok(q.read(|c| c.value))).named("value");
    let step = context.make_selector(|q| Ok(q.read(|c| c.step))).named("step");
    let advanced = {
        let (value, step) = (value.clone(), step.clone());
        context
            .make_selector(move |q| Ok(q.query(&value)? + q.query(&step)?))
            .named("advanced")
    };

    let reasons = Rc::new(RefCell::new(Vec::new()));
    {
        let reasons = reasons.clone();
        context.set_computation_wrapper(move |computation| {
            reasons.borrow_mut().push((
                computation.selector().key().label().to_string(),
                computation.reason().map(|key| key.label().to_string()),
            ));
            computation.proceed()
        });
    }

    advanced.select(&counter(1, 1)).unwrap();
    advanced.select(&counter(1, 5)).unwrap();

    let reasons = reasons.borrow();
    assert_eq!(reasons[0], ("advanced".to_string(), None));
    assert_eq!(reasons[1], ("value".to_string(), None));
    assert_eq!(reasons[2], ("step".to_string(), None));
    assert_eq!(reasons[3].0, "step");
    assert!(reasons[3].1.is_some());
    assert_eq!(reasons[4], ("advanced".to_string(), Some("step".to_string())));
    assert_eq!(reasons.len(), 5);
}

#[test]
fn test_computation_wrapper_not_called_on_cache_hit() {
    let context = SelectionContext::<Counter>::new();
    let computations = Rc::new(Cell::new(0));
    {
        let computations = computations.clone();
        context.set_computation_wrapper(move |computation| {
            computations.set(computations.get() + 1);
            computation.proceed()
        });
    }
    let value = context.make_selector(|q| Ok(q.read(|c| c.value)));

    let state = counter(9, 0);
    value.select(&state).unwrap();
    value.select(&state).unwrap();
    value.select(&counter(9, 1)).unwrap();
    assert_eq!(computations.get(), 1);
}

#[test]
fn test_wrappers_replace_instead_of_stacking() {
    let context = SelectionContext::<Counter>::new();
    let first = Rc::new(Cell::new(0));
    let second = Rc::new(Cell::new(0));
    {
        let first = first.clone();
        context.set_invocation_wrapper(move |invocation| {
            first.set(first.get() + 1);
            invocation.proceed()
        });
    }
    {
        let second = second.clone();
        context.set_invocation_wrapper(move |invocation| {
            second.set(second.get() + 1);
            invocation.proceed()
        });
    }
    let value = context.make_selector(|q| Ok(q.read(|c| c.value)));

    value.select(&counter(0, 0)).unwrap();
    assert_eq!(first.get(), 0);
    assert_eq!(second.get(), 1);

    context.clear_invocation_wrapper();
    value.select(&counter(0, 0)).unwrap();
    assert_eq!(second.get(), 1);
}

#[test]
fn test_wrappers_are_scoped_to_their_context() {
    let watched = SelectionContext::<Counter>::new();
    let other = SelectionContext::<Counter>::new();
    let calls = Rc::new(Cell::new(0));
    {
        let calls = calls.clone();
        watched.set_computation_wrapper(move |computation| {
            calls.set(calls.get() + 1);
            computation.proceed()
        });
    }
    let unwatched = other.make_selector(|q| Ok(q.read(|c| c.value)));
    let observed = watched.make_selector(|q| Ok(q.read(|c| c.value)));

    unwatched.select(&counter(1, 1)).unwrap();
    assert_eq!(calls.get(), 0);

    observed.select(&counter(1, 1)).unwrap();
    assert_eq!(calls.get(), 1);

    unwatched.select(&counter(2, 1)).unwrap();
    assert_eq!(calls.get(), 1);

    watched.clear_computation_wrapper();
    observed.select(&counter(2, 1)).unwrap();
    assert_eq!(observed.recomputations(), 2);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_errors_flow_back_through_proceed() {
    let context = SelectionContext::<Counter>::new();
    let invocation_errors = Rc::new(RefCell::new(Vec::new()));
    let computation_errors = Rc::new(RefCell::new(Vec::new()));
    {
        let errors = invocation_errors.clone();
        context.set_invocation_wrapper(move |invocation| {
            let proceeded = invocation.proceed();
            errors.borrow_mut().push(proceeded.error().map(|e| e.to_string()));
            proceeded
        });
    }
    {
        let errors = computation_errors.clone();
        context.set_computation_wrapper(move |computation| {
            let proceeded = computation.proceed();
            errors.borrow_mut().push(proceeded.error().map(|e| e.to_string()));
            proceeded
        });
    }
    let halved = context.make_selector(|q| {
        let value = q.read(|c| c.value);
        if value % 2 != 0 {
            return Err(anyhow::anyhow!("odd value {value}").into());
        }
        Ok(value / 2)
    });

    let err = halved.select(&counter(3, 0)).unwrap_err();
    assert!(err.user_error().is_some());
    assert!(err.to_string().contains("odd value 3"));
    assert!(halved.introspect().is_none());

    assert_eq!(halved.select(&counter(8, 0)).unwrap(), 4);
    assert_eq!(*halved.introspect().unwrap().value(), 4);

    let expected = vec![Some("user error: odd value 3".to_string()), None];
    assert_eq!(*invocation_errors.borrow(), expected);
    assert_eq!(*computation_errors.borrow(), expected);
}

// =============================================================================
// Event Collector
// =============================================================================

#[test]
fn test_event_collector_order() {
    let context = SelectionContext::<Counter>::new();
    let collector = Rc::new(EventCollector::new());
    collector.clone().install(&context);

    let value = context.make_selector(|q| Ok(q.read(|c| c.value))).named("value");
    let doubled = {
        let value = value.clone();
        context.make_selector(move |q| Ok(q.query(&value)? * 2)).named("doubled")
    };

    doubled.select(&counter(4, 0)).unwrap();
    let events = collector.take();
    let labels: Vec<(&str, &str)> = events
        .iter()
        .map(|event| match event {
            SelectorEvent::Invoked { selector, .. } => ("invoked", selector.label()),
            SelectorEvent::Computed { selector, .. } => ("computed", selector.label()),
        })
        .collect();
    assert_eq!(
        labels,
        vec![
            ("invoked", "doubled"),
            ("computed", "doubled"),
            ("invoked", "value"),
            ("computed", "value"),
        ]
    );

    doubled.select(&counter(5, 0)).unwrap();
    let events = collector.take();
    assert_eq!(events.len(), 5);
    assert_eq!(events[1], SelectorEvent::Invoked { selector: value.key(), ok: true });
    assert_eq!(
        events[3],
        SelectorEvent::Computed {
            selector: doubled.key(),
            reason: Some(value.key()),
            recomputations: 2,
            ok: true,
        }
    );
    assert_eq!(events[4].selector(), &value.key());
    assert!(collector.events().is_empty());
}

#[test]
fn test_event_collector_marks_failures() {
    let context = SelectionContext::<Counter>::new();
    let collector = Rc::new(EventCollector::new());
    collector.clone().install(&context);

    let broken = context.make_selector(|_q| Ok(0i64));
    let err = broken.select(&counter(0, 0)).unwrap_err();
    assert!(matches!(err, SelectError::NoDependencies { .. }));

    // The logic itself succeeded; the missing dependencies fail the call.
    assert_eq!(
        collector.events(),
        vec![
            SelectorEvent::Invoked { selector: broken.key(), ok: false },
            SelectorEvent::Computed {
                selector: broken.key(),
                reason: None,
                recomputations: 1,
                ok: true,
            },
        ]
    );
    assert_eq!(collector.invocation_count(), 1);
    assert_eq!(collector.computation_count(), 1);

    collector.clear();
    assert!(collector.events().is_empty());
}

#[cfg(feature = "serde")]
#[test]
fn test_events_serialize() {
    let context = SelectionContext::<Counter>::new();
    let collector = Rc::new(EventCollector::new());
    collector.clone().install(&context);

    let value = context.make_selector(|q| Ok(q.read(|c| c.value))).named("value");
    value.select(&counter(1, 0)).unwrap();

    let json = serde_json::to_string(&collector.events()).unwrap();
    assert!(json.contains("\"Invoked\""));
    assert!(json.contains("\"Computed\""));
    assert!(json.contains("\"value\""));
}

// =============================================================================
// Tracing
// =============================================================================

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[test]
fn test_tracing_inspector_logs() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter("selector_flow=trace")
        .with_writer({
            let capture = capture.clone();
            move || capture.clone()
        })
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let context = SelectionContext::<Counter>::builder().name("counters").build::<Counter>();
        TracingInspector.install(&context);

        let value = context.make_selector(|q| Ok(q.read(|c| c.value))).named("value");
        value.select(&counter(1, 0)).unwrap();
        value.select(&counter(2, 0)).unwrap();
    });

    let output = capture.contents();
    assert!(output.contains("recomputing selector"));
    let started: Vec<&str> = output
        .lines()
        .filter(|line| line.contains("selection logic started"))
        .collect();
    assert_eq!(started.len(), 2);
    assert!(!started[0].contains("reason="));
    assert!(started[1].contains("reason="));
    assert!(output.contains("new state observed"));
    assert!(output.contains("counters"));
}

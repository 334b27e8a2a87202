//! Error types for selector evaluation.

use std::fmt;
use std::sync::Arc;

/// Errors raised while evaluating a selector.
///
/// User errors can be propagated from selection logic with the `?` operator,
/// which converts any `Into<anyhow::Error>` type into
/// [`SelectError::UserError`].
#[derive(Debug, Clone)]
pub enum SelectError {
    /// The selection logic ran to completion without querying any selector.
    ///
    /// Every selection logic must read at least one dependency through the
    /// query, otherwise there is nothing to revalidate the cache against.
    /// This is a programming error and is raised on every invocation.
    NoDependencies {
        /// Label of the offending selector.
        selector: String,
    },

    /// A selector was re-entered while it was still being evaluated.
    ///
    /// Only reported when cycle detection is enabled on the context.
    Cycle {
        /// Labels of the selectors forming the cycle, outermost first.
        path: Vec<String>,
    },

    /// Error returned by user selection logic.
    ///
    /// User errors are never cached: the next invocation runs the
    /// selection logic again.
    UserError(Arc<anyhow::Error>),
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectError::NoDependencies { selector } => write!(
                f,
                "selector malfunction: {} must select some data by querying at least one selector",
                selector
            ),
            SelectError::Cycle { path } => {
                write!(f, "selector cycle detected: {}", path.join(" -> "))
            }
            SelectError::UserError(e) => write!(f, "user error: {}", e),
        }
    }
}

impl<T: Into<anyhow::Error>> From<T> for SelectError {
    fn from(err: T) -> Self {
        SelectError::UserError(Arc::new(err.into()))
    }
}

impl SelectError {
    /// Returns a reference to the inner user error if this is a `UserError` variant.
    pub fn user_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            SelectError::UserError(e) => Some(e),
            _ => None,
        }
    }

    /// Attempts to downcast the user error to a specific type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.user_error().and_then(|e| e.downcast_ref::<E>())
    }

    /// Returns `true` if this is a `UserError` containing an error of type `E`.
    pub fn is<E: std::error::Error + Send + Sync + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }
}

//! Selector identity.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Diagnostic label of a key. Cloning never allocates.
#[derive(Clone)]
pub(crate) enum Label {
    Static(&'static str),
    Shared(Arc<str>),
}

impl Label {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            Label::Static(label) => label,
            Label::Shared(label) => label,
        }
    }
}

impl From<Cow<'static, str>> for Label {
    fn from(label: Cow<'static, str>) -> Self {
        match label {
            Cow::Borrowed(label) => Label::Static(label),
            Cow::Owned(label) => Label::Shared(label.into()),
        }
    }
}

impl From<String> for Label {
    fn from(label: String) -> Self {
        Label::Shared(label.into())
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.as_str().to_string()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Label {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Label {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Label::from)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a selector.
///
/// Two keys are equal when they identify the same selector object: the same
/// reader function, the same shared closure allocation or the same memoized
/// selector. The label is carried along for diagnostics only and never takes
/// part in comparisons.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectorKey {
    id: usize,
    label: Label,
}

impl SelectorKey {
    /// Create a key from an identity and a label.
    #[inline]
    pub fn new(id: usize, label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id,
            label: Label::from(label.into()),
        }
    }

    /// Create a key identified by the address of `target`.
    ///
    /// The caller must keep `target` alive for as long as the key is used to
    /// tell selectors apart.
    #[inline]
    pub fn of_ptr<T: ?Sized>(target: *const T, label: impl Into<Cow<'static, str>>) -> Self {
        Self::new(target as *const () as usize, label)
    }

    pub(crate) fn labeled<T: ?Sized>(target: *const T, label: Label) -> Self {
        Self {
            id: target as *const () as usize,
            label,
        }
    }

    /// The identity part of the key.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Human-readable label.
    #[inline]
    pub fn label(&self) -> &str {
        self.label.as_str()
    }
}

impl PartialEq for SelectorKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SelectorKey {}

impl Hash for SelectorKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for SelectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.label(), self.id)
    }
}

impl fmt::Display for SelectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

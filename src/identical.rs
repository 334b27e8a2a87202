//! Output equality used to decide whether a dependency changed.
//!
//! Revalidation compares the value a dependency returned last time with the
//! value it returns now. The comparison is shallow: shared pointers compare
//! by address, plain values and strings by value, containers element by
//! element. State must therefore be updated persistently, keeping the same
//! `Arc` for every subtree that did not change.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;
use std::sync::Arc;

/// Shallow "is this the same output" comparison.
///
/// Implement this for custom output types to declare how a selector's
/// result is compared when it is used as a dependency.
///
/// # Example
///
/// ```
/// use selector_flow::Identical;
///
/// #[derive(Clone)]
/// struct Total {
///     cents: i64,
/// }
///
/// impl Identical for Total {
///     fn identical(&self, other: &Self) -> bool {
///         self.cents == other.cents
///     }
/// }
/// ```
pub trait Identical {
    /// Returns `true` if `self` and `other` are the same output.
    fn identical(&self, other: &Self) -> bool;
}

macro_rules! identical_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Identical for $ty {
                #[inline]
                fn identical(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

identical_by_value!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
    str,
);

impl<T: ?Sized> Identical for Arc<T> {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Identical for Rc<T> {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl Identical for &str {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        self == other
    }
}

impl<T: Identical> Identical for Option<T> {
    fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.identical(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Identical, E: Identical> Identical for Result<T, E> {
    fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Ok(a), Ok(b)) => a.identical(b),
            (Err(a), Err(b)) => a.identical(b),
            _ => false,
        }
    }
}

impl<T: Identical> Identical for [T] {
    fn identical(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.identical(b))
    }
}

impl<T: Identical> Identical for Vec<T> {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        self.as_slice().identical(other.as_slice())
    }
}

impl<T: Identical, const N: usize> Identical for [T; N] {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        self.as_slice().identical(other.as_slice())
    }
}

impl<T: Identical + ?Sized> Identical for Box<T> {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        (**self).identical(&**other)
    }
}

impl<K: Ord, V: Identical> Identical for BTreeMap<K, V> {
    fn identical(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other)
                .all(|((ka, va), (kb, vb))| ka == kb && va.identical(vb))
    }
}

impl<K: Ord> Identical for BTreeSet<K> {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        self == other
    }
}

impl<K: Eq + Hash, V: Identical, H: BuildHasher> Identical for HashMap<K, V, H> {
    fn identical(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|theirs| value.identical(theirs)))
    }
}

impl<K: Eq + Hash, H: BuildHasher> Identical for HashSet<K, H> {
    #[inline]
    fn identical(&self, other: &Self) -> bool {
        self == other
    }
}

macro_rules! identical_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Identical),+> Identical for ($($name,)+) {
            fn identical(&self, other: &Self) -> bool {
                $(self.$idx.identical(&other.$idx))&&+
            }
        }
    };
}

identical_tuple!(A: 0);
identical_tuple!(A: 0, B: 1);
identical_tuple!(A: 0, B: 1, C: 2);
identical_tuple!(A: 0, B: 1, C: 2, D: 3);
identical_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
identical_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

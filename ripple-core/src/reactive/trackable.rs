//! Values that can live in a ref or a computed.

use std::rc::Rc;

/// A value the runtime can store and compare.
///
/// `same_value` is the change test used on every write: a write that
/// produces the same value notifies nobody. The default is `==`; floats
/// override it so that `NaN` equals `NaN` (and `0.0` differs from `-0.0`),
/// otherwise every `NaN` write would look like a change.
///
/// Implementing it for your own type is one line:
///
/// ```rust
/// use ripple_core::Trackable;
///
/// #[derive(Clone, PartialEq)]
/// struct Point { x: i32, y: i32 }
///
/// impl Trackable for Point {}
/// ```
pub trait Trackable: Clone + PartialEq + 'static {
    /// Whether `self` and `other` are the same for change detection.
    fn same_value(&self, other: &Self) -> bool {
        self == other
    }

    /// Convert a value on its way into a ref. Dynamic values use this to
    /// swap plain objects for their reactive proxy.
    fn into_reactive(self) -> Self {
        self
    }

    /// Read every nested tracked value, so the active subscriber depends on
    /// the whole structure. Used by deep watchers.
    fn traverse(&self) {}
}

macro_rules! impl_trackable {
    ($($ty:ty),* $(,)?) => {
        $(impl Trackable for $ty {})*
    };
}

impl_trackable!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String,
    &'static str, Rc<str>,
);

impl Trackable for f64 {
    fn same_value(&self, other: &Self) -> bool {
        (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
    }
}

impl Trackable for f32 {
    fn same_value(&self, other: &Self) -> bool {
        (self.is_nan() && other.is_nan()) || self.to_bits() == other.to_bits()
    }
}

impl<T: Trackable> Trackable for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }

    fn into_reactive(self) -> Self {
        self.map(Trackable::into_reactive)
    }

    fn traverse(&self) {
        if let Some(value) = self {
            value.traverse();
        }
    }
}

impl<T: Trackable> Trackable for Vec<T> {
    fn same_value(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.same_value(b))
    }

    fn into_reactive(self) -> Self {
        self.into_iter().map(Trackable::into_reactive).collect()
    }

    fn traverse(&self) {
        self.iter().for_each(Trackable::traverse);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_the_same_as_nan() {
        assert!(f64::NAN.same_value(&f64::NAN));
        assert!(f32::NAN.same_value(&f32::NAN));
        assert!(!1.0f64.same_value(&f64::NAN));
    }

    #[test]
    fn signed_zeros_differ() {
        assert!(!0.0f64.same_value(&-0.0));
        assert!(1.5f64.same_value(&1.5));
    }

    #[test]
    fn containers_compare_elementwise() {
        assert!(vec![f64::NAN, 1.0].same_value(&vec![f64::NAN, 1.0]));
        assert!(!vec![1, 2].same_value(&vec![1, 2, 3]));
        assert!(Some(f64::NAN).same_value(&Some(f64::NAN)));
        assert!(!Some(1).same_value(&None));
    }
}

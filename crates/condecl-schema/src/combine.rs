//! Field-wise layering of configuration objects.

/// Right-hand-side-wins merge of two values of the same shape.
///
/// For optional fields "unset" (`None`) keeps the left value; anything set,
/// including an empty list or `false`, replaces it.
pub trait Combine: Sized {
    #[must_use]
    fn combine(self, other: Self) -> Self;
}

impl<T> Combine for Option<T> {
    fn combine(self, other: Self) -> Self {
        other.or(self)
    }
}

/// Implement [`Combine`] for a struct by combining each listed field.
///
/// Every field of the struct must be listed.
#[macro_export]
macro_rules! impl_combine {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::combine::Combine for $ty {
            fn combine(self, other: Self) -> Self {
                Self {
                    $($field: $crate::combine::Combine::combine(self.$field, other.$field),)*
                }
            }
        }
    };
}

/// Apply `overrides` to `base` left to right.
pub fn combine<C: Combine>(base: C, overrides: impl IntoIterator<Item = C>) -> C {
    overrides.into_iter().fold(base, Combine::combine)
}

//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Ledger snapshots and quality splits are values: they are produced fresh for
/// every engine invocation and two of them with the same figures are the same
/// thing. They are never updated in place; the engine computes a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct Pending {
///     quantity: f64,
///     weight: f64,
/// }
///
/// impl ValueObject for Pending {}
///
/// assert_eq!(Pending { quantity: 60.0, weight: 300.0 }, Pending { quantity: 60.0, weight: 300.0 });
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

//! Hard-coded constants for the HSS crate and its dependents.

/// Default truncation tolerance used by [`crate::Config::default`].
pub const DEFAULT_TOL: f64 = 1e-10;

/// Default leaf size used by [`crate::Config::default`].
pub const DEFAULT_LEAFSIZE: usize = 32;

/// For avoiding divide-by-zero errors in tolerance-relative comparisons.
pub const EPSILON: f64 = 1e-12;

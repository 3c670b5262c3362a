//! Conditional parallel iteration.
//!
//! With the `parallel` feature (on by default) the macros below dispatch to
//! rayon; without it they fall back to ordinary sequential iterators. Every
//! caller collects into an ordered `Vec`, so results are identical either way.
//!
//! ```ignore
//! use crate::iter_maybe_parallel;
//!
//! let fitted: Vec<_> = iter_maybe_parallel!(0..n_curves)
//!     .map(|i| smooth_one(i))
//!     .collect();
//! ```

/// Iterate a range or an owned collection, in parallel when the `parallel`
/// feature is enabled.
#[macro_export]
macro_rules! iter_maybe_parallel {
    ($expr:expr) => {{
        #[cfg(feature = "parallel")]
        {
            use rayon::iter::IntoParallelIterator;

            IntoParallelIterator::into_par_iter($expr)
        }
        #[cfg(not(feature = "parallel"))]
        {
            IntoIterator::into_iter($expr)
        }
    }};
}

/// Iterate a slice by reference, in parallel when the `parallel` feature is
/// enabled.
#[macro_export]
macro_rules! slice_maybe_parallel {
    ($expr:expr) => {{
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            $expr.par_iter()
        }
        #[cfg(not(feature = "parallel"))]
        {
            $expr.iter()
        }
    }};
}

pub use iter_maybe_parallel;
pub use slice_maybe_parallel;

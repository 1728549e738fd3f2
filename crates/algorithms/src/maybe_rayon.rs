//! rayon or sequential iteration, chosen by the `parallel` feature.
//!
//! With `parallel` on, rayon's prelude is re-exported. Without it, a
//! sequential `into_par_iter()` stand-in keeps the per-row kernels compiling
//! unchanged; the rest of the chain resolves to `Iterator` methods.
#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;

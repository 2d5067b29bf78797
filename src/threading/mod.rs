//! Thread reconstruction from the indexed cache.

mod builder;

pub use builder::{ThreadError, ThreadSort, ThreadView, build_thread};

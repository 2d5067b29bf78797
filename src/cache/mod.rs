//! The post cache: controller, index, frozen store, and date domain.
//!
//! The controller owns everything: the LRU of frozen posts, the
//! [`index::PostIndex`], the covered date ranges, and the enable/state
//! flags. No other component mutates cache state.

pub mod controller;
pub mod index;
pub mod ranges;
pub mod scope;
pub mod store;

pub use controller::{CacheConfig, PostCache};
pub use index::PostIndex;
pub use scope::{PostFilter, QueryContext, QueryScope, RefreshScope, SortBy};
pub use store::CacheStats;

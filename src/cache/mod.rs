//! Query cache and optimistic mutation engine.
//!
//! - **QueryCache**: keyed store of fetched results with cancellable reads
//! - **OptimisticMutation**: patches an entry ahead of a remote write and
//!   restores it when the write fails
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! reconcile_on_success = false
//! ```

mod config;
mod keys;
mod lock;
mod mutation;
mod store;

pub use config::CacheConfig;
pub use keys::{FEED_QUERY, ParamValue, QueryKey, QueryParams};
pub use mutation::{
    Mutation, MutationContext, MutationError, MutationOutcome, MutationState, OptimisticMutation,
    PendingMutation,
};
pub use store::{CacheEntry, CacheError, EntryStatus, QueryCache};

pub(crate) use mutation::{
    METRIC_MUTATION_COMMITTED, METRIC_MUTATION_MS, METRIC_MUTATION_ROLLED_BACK,
};
pub(crate) use store::{METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_FETCH_CANCELLED};

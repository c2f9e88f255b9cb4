//! Paginated post feed with optimistic like/unlike mutations.
//!
//! Feed pages are read through a keyed [`cache::QueryCache`]. Likes are applied
//! to the cached page before the remote call completes, any in-flight read of
//! that page is cancelled first, and a failed call restores the page as it was.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

//! Application services: feed reads and like/unlike mutations.

pub mod error;
pub mod feed;
pub mod likes;
pub mod pagination;
pub mod repos;

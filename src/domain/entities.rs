//! Feed entities as delivered by the feed source.
//!
//! All values are treated as immutable once built: the `with_*`/`without_*`
//! helpers return new values and leave the receiver untouched, so a page held
//! as a cache snapshot never changes underneath its holder.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use super::error::DomainError;

/// A single "like" left on a post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LikeRecord {
    pub user_id: String,
    pub user_name: String,
}

/// The set of users that like a post.
///
/// Holds at most one record per `user_id`. Iteration follows the order in
/// which users first liked the post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LikedBy(Vec<LikeRecord>);

impl LikedBy {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.0.iter().any(|record| record.user_id == user_id)
    }

    /// Add `record` unless its user already likes the post. Returns whether it was added.
    pub fn insert(&mut self, record: LikeRecord) -> bool {
        if self.contains(&record.user_id) {
            return false;
        }
        self.0.push(record);
        true
    }

    /// Remove the record belonging to `user_id`, if any.
    pub fn remove(&mut self, user_id: &str) -> Option<LikeRecord> {
        let index = self.0.iter().position(|record| record.user_id == user_id)?;
        Some(self.0.remove(index))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LikeRecord> {
        self.0.iter()
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|record| record.user_id.as_str())
    }
}

impl FromIterator<LikeRecord> for LikedBy {
    fn from_iter<I: IntoIterator<Item = LikeRecord>>(iter: I) -> Self {
        let mut liked_by = LikedBy::new();
        for record in iter {
            liked_by.insert(record);
        }
        liked_by
    }
}

impl<'de> Deserialize<'de> for LikedBy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let records = Vec::<LikeRecord>::deserialize(deserializer)?;
        Ok(records.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub liked_by: LikedBy,
}

impl Post {
    /// A copy of this post that `actor` likes.
    pub fn with_like(&self, actor: &Actor) -> Self {
        let mut liked_by = self.liked_by.clone();
        liked_by.insert(actor.like_record());
        Self {
            liked_by,
            ..self.clone()
        }
    }

    /// A copy of this post without the like left by `user_id`.
    pub fn without_like(&self, user_id: &str) -> Self {
        let mut liked_by = self.liked_by.clone();
        liked_by.remove(user_id);
        Self {
            liked_by,
            ..self.clone()
        }
    }
}

/// One page of the feed together with the total number of published posts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub post_count: u64,
}

impl FeedPage {
    /// Build a page, rejecting duplicate post ids.
    pub fn new(posts: Vec<Post>, post_count: u64) -> Result<Self, DomainError> {
        let mut seen = HashSet::with_capacity(posts.len());
        for post in &posts {
            if !seen.insert(post.id.as_str()) {
                return Err(DomainError::invariant(format!(
                    "post `{}` appears more than once in a feed page",
                    post.id
                )));
            }
        }
        Ok(Self { posts, post_count })
    }

    pub fn post(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.post_count == 0
    }

    /// A copy of this page where the post `id` is replaced by `update(post)`.
    ///
    /// Post order is preserved. An unknown id yields an identical page.
    pub fn map_post(&self, id: &str, update: impl FnOnce(&Post) -> Post) -> Self {
        let mut update = Some(update);
        let posts = self
            .posts
            .iter()
            .map(|post| match update.take_if(|_| post.id == id) {
                Some(update) => update(post),
                None => post.clone(),
            })
            .collect();
        Self {
            posts,
            post_count: self.post_count,
        }
    }
}

/// The signed-in user performing a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Result<Self, DomainError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(DomainError::validation("actor user id must not be empty"));
        }
        Ok(Self {
            user_id,
            user_name: user_name.into(),
        })
    }

    pub fn like_record(&self) -> LikeRecord {
        LikeRecord {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
        }
    }
}

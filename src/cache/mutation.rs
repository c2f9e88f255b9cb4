//! Optimistic mutations over the query cache.
//!
//! An invocation cancels any in-flight read of the target key, snapshots the
//! current entry while writing the patched one, then sends the remote call.
//! A failed call restores the snapshot. A confirmed call takes no cache
//! action, so the patched entry stays `Pending` until a later read replaces it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::repos::SourceError;
use crate::domain::entities::Actor;

use super::config::CacheConfig;
use super::keys::QueryKey;
use super::store::{CacheEntry, QueryCache};

pub(crate) const METRIC_MUTATION_COMMITTED: &str = "likefeed_mutation_committed_total";
pub(crate) const METRIC_MUTATION_ROLLED_BACK: &str = "likefeed_mutation_rolled_back_total";
pub(crate) const METRIC_MUTATION_MS: &str = "likefeed_mutation_ms";

/// One kind of remote write with a local prediction of its effect.
#[async_trait]
pub trait Mutation: Send + Sync {
    type Input: fmt::Debug + Send + Sync;
    type Data: Send + Sync;

    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Predict the cached value after the write. Must not modify `data`.
    fn patch(&self, data: &Self::Data, input: &Self::Input, actor: &Actor) -> Self::Data;

    /// Perform the write on the remote side.
    async fn send(&self, input: &Self::Input) -> Result<(), SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Mutating,
    Committed,
    RolledBack,
}

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("mutation `{mutation}` requires an authenticated actor")]
    AuthRequired { mutation: &'static str },
}

/// What an invocation captured before patching; consumed when it settles.
#[derive(Debug)]
pub struct MutationContext<T> {
    pub snapshot: Option<CacheEntry<T>>,
}

/// How a settled invocation ended.
#[derive(Debug)]
pub enum MutationOutcome {
    Committed,
    RolledBack { error: SourceError },
}

impl MutationOutcome {
    pub fn state(&self) -> MutationState {
        match self {
            MutationOutcome::Committed => MutationState::Committed,
            MutationOutcome::RolledBack { .. } => MutationState::RolledBack,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, MutationOutcome::Committed)
    }
}

/// Applies one `Mutation` optimistically against a shared cache.
pub struct OptimisticMutation<M: Mutation> {
    cache: Arc<QueryCache<M::Data>>,
    mutation: M,
    config: CacheConfig,
}

impl<M: Mutation> OptimisticMutation<M> {
    pub fn new(cache: Arc<QueryCache<M::Data>>, mutation: M, config: CacheConfig) -> Self {
        Self {
            cache,
            mutation,
            config,
        }
    }

    pub fn mutation(&self) -> &M {
        &self.mutation
    }

    /// Apply the optimistic patch and hand back the not-yet-sent remote call.
    ///
    /// Fails before touching the cache when `actor` is absent.
    pub async fn begin(
        &self,
        key: QueryKey,
        input: M::Input,
        actor: Option<&Actor>,
    ) -> Result<PendingMutation<'_, M>, MutationError> {
        let actor = actor.ok_or(MutationError::AuthRequired {
            mutation: self.mutation.name(),
        })?;

        let snapshot = self
            .cache
            .cancel_and_update(&key, |entry| {
                entry.patched(self.mutation.patch(entry.data(), &input, actor))
            })
            .await;

        let invocation_id = Uuid::new_v4();
        debug!(
            %invocation_id,
            mutation = self.mutation.name(),
            query = %key,
            ?input,
            patched = snapshot.is_some(),
            "optimistic patch applied"
        );

        Ok(PendingMutation {
            engine: self,
            key,
            input,
            context: MutationContext { snapshot },
            invocation_id,
            started_at: Instant::now(),
        })
    }

    /// Run a complete invocation: patch, send, then commit or roll back.
    ///
    /// Remote failures are recovered here and reported through the outcome.
    pub async fn invoke(
        &self,
        key: QueryKey,
        input: M::Input,
        actor: Option<&Actor>,
    ) -> Result<MutationOutcome, MutationError> {
        let pending = self.begin(key, input, actor).await?;
        Ok(pending.settle().await)
    }
}

/// An invocation whose optimistic patch is in the cache and whose remote call
/// has not completed.
#[must_use = "the remote call is only sent, and a failure only rolled back, by `settle`"]
pub struct PendingMutation<'a, M: Mutation> {
    engine: &'a OptimisticMutation<M>,
    key: QueryKey,
    input: M::Input,
    context: MutationContext<M::Data>,
    invocation_id: Uuid,
    started_at: Instant,
}

impl<M: Mutation> PendingMutation<'_, M> {
    pub fn state(&self) -> MutationState {
        MutationState::Mutating
    }

    pub fn context(&self) -> &MutationContext<M::Data> {
        &self.context
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Send the remote call and resolve the invocation.
    #[instrument(
        skip(self),
        fields(
            invocation_id = %self.invocation_id,
            mutation = self.engine.mutation.name(),
            query = %self.key,
        )
    )]
    pub async fn settle(self) -> MutationOutcome {
        let PendingMutation {
            engine,
            key,
            input,
            context,
            started_at,
            ..
        } = self;
        let name = engine.mutation.name();

        let outcome = match engine.mutation.send(&input).await {
            Ok(()) => {
                if engine.config.reconcile_on_success {
                    engine.cache.invalidate(&key);
                }
                counter!(METRIC_MUTATION_COMMITTED, "mutation" => name).increment(1);
                info!(result = "committed", "mutation confirmed");
                MutationOutcome::Committed
            }
            Err(error) => {
                let restored = match context.snapshot {
                    Some(snapshot) => {
                        engine.cache.write(key, snapshot);
                        true
                    }
                    None => false,
                };
                counter!(METRIC_MUTATION_ROLLED_BACK, "mutation" => name).increment(1);
                warn!(
                    result = "rolled_back",
                    restored,
                    error = %error,
                    "mutation failed; optimistic patch reverted"
                );
                MutationOutcome::RolledBack { error }
            }
        };

        histogram!(METRIC_MUTATION_MS, "mutation" => name)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        outcome
    }
}

//! Commit lifecycle hooks.
//!
//! A [`Plugin`] observes (and may veto) each commit. Plugins are handed to the
//! engine as an ordered list at construction; the commit pipeline awaits each
//! hook in that order, so side effects never interleave within one commit.

use async_trait::async_trait;

use eventide_core::Entity;

use crate::RecordedEvent;

/// Outcome of a `before_commit` hook.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HookDecision {
    Proceed,
    /// Skip persistence and every remaining hook. Not an error.
    Abort,
}

impl HookDecision {
    pub fn is_abort(self) -> bool {
        matches!(self, HookDecision::Abort)
    }
}

/// Arguments shared by every hook of one commit.
#[derive(Debug)]
pub struct CommitContext<'a, S> {
    /// The event being committed, already passed through the mapper.
    pub event: &'a RecordedEvent,
    /// The candidate entity produced by folding `event`.
    pub entity: &'a Entity<S>,
    /// The entity the command started from (`None` for `create`).
    pub prior: Option<&'a Entity<S>>,
}

impl<S> Clone for CommitContext<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for CommitContext<'_, S> {}

/// Capability set around persistence. Both hooks default to no-ops.
#[async_trait]
pub trait Plugin<S>: Send + Sync
where
    S: Send + Sync,
{
    /// Name used in logs and in `CommitOutcome::Aborted`.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    async fn before_commit(&self, _ctx: CommitContext<'_, S>) -> HookDecision {
        HookDecision::Proceed
    }

    async fn on_committed(&self, _ctx: CommitContext<'_, S>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eventide_core::{EntityId, EventId};
    use serde_json::json;

    struct Quiet;

    #[async_trait]
    impl Plugin<u32> for Quiet {}

    struct Veto;

    #[async_trait]
    impl Plugin<u32> for Veto {
        fn name(&self) -> &str {
            "veto"
        }

        async fn before_commit(&self, ctx: CommitContext<'_, u32>) -> HookDecision {
            if ctx.entity.state > 10 {
                HookDecision::Abort
            } else {
                HookDecision::Proceed
            }
        }
    }

    fn fixtures(state: u32) -> (RecordedEvent, Entity<u32>) {
        let entity_id = EntityId::new();
        let now = Utc::now();
        let event = RecordedEvent {
            event_id: EventId::new(),
            event_name: "bump".into(),
            event_created_at: now,
            entity_name: "counter".into(),
            entity_id,
            revision: None,
            body: json!({}),
        };
        let entity = Entity {
            entity_id,
            entity_name: "counter".into(),
            created_at: now,
            updated_at: now,
            state,
        };
        (event, entity)
    }

    #[tokio::test]
    async fn default_hooks_proceed() {
        let (event, entity) = fixtures(99);
        let ctx = CommitContext { event: &event, entity: &entity, prior: None };
        assert_eq!(Quiet.before_commit(ctx).await, HookDecision::Proceed);
        Quiet.on_committed(ctx).await;
        assert!(Quiet.name().ends_with("Quiet"));
    }

    #[tokio::test]
    async fn hooks_see_candidate_state() {
        let (event, small) = fixtures(3);
        let (_, big) = fixtures(11);
        let allow = CommitContext { event: &event, entity: &small, prior: None };
        let deny = CommitContext { event: &event, entity: &big, prior: Some(&small) };

        assert_eq!(Veto.before_commit(allow).await, HookDecision::Proceed);
        assert!(Veto.before_commit(deny).await.is_abort());
    }
}

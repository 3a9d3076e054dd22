use async_trait::async_trait;
use tessera_core::clock::SharedClock;
use tessera_core::context::ExecutionContext;
use tessera_core::error::DomainError;
use tessera_core::inbox::Inbox;

use super::MemoryDatabase;

/// [`Inbox`] over a [`MemoryDatabase`].
#[derive(Clone)]
pub struct InMemoryInbox {
    db: MemoryDatabase,
    clock: SharedClock,
}

impl std::fmt::Debug for InMemoryInbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryInbox").field("db", &self.db).finish_non_exhaustive()
    }
}

impl InMemoryInbox {
    pub(crate) fn new(db: MemoryDatabase, clock: SharedClock) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl Inbox for InMemoryInbox {
    async fn is_processed(
        &self,
        ctx: &ExecutionContext,
        message_id: &str,
    ) -> Result<bool, DomainError> {
        self.db
            .with_state(ctx, |state| Ok(state.inbox.contains_key(message_id)))
            .await
    }

    async fn mark_processed(
        &self,
        ctx: &ExecutionContext,
        message_id: &str,
    ) -> Result<bool, DomainError> {
        let now = self.clock.now();
        self.db
            .with_state(ctx, |state| {
                if state.inbox.contains_key(message_id) {
                    return Ok(false);
                }
                state.inbox.insert(message_id.to_owned(), now);
                Ok(true)
            })
            .await
    }
}

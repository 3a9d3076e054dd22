//! Execution context carried through one logical flow.
//!
//! Every port call takes an [`ExecutionContext`] as its first argument. It
//! holds the caller's identity (tenant, user, request) and, while a unit of
//! work is open, the handle of the database transaction that outbox appends,
//! inbox marks and business writes must share. Contexts are cheap to clone and
//! are never shared mutably between concurrent flows: a transaction is only
//! visible to the clone that [`run_in_transaction`](crate::transaction::run_in_transaction)
//! hands to its closure, and disappears when that clone is dropped.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::transaction::TransactionHandle;

/// Who is acting, on behalf of which tenant, in which request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Tenant the flow acts on behalf of.
    pub tenant_id: Option<String>,
    /// Authenticated user, if any.
    pub user_id: Option<String>,
    /// Request identifier for correlation.
    pub request_id: Option<String>,
}

impl Identity {
    /// Builds an identity from its three optional parts.
    #[must_use]
    pub fn new(
        tenant_id: Option<String>,
        user_id: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        Self {
            tenant_id,
            user_id,
            request_id,
        }
    }

    /// Returns `true` when a user is attached.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }
}

/// Ambient state for one unit of work.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    identity: Arc<Identity>,
    transaction: Option<TransactionHandle>,
}

impl ExecutionContext {
    /// Creates a context for the given identity, outside any transaction.
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self {
            identity: Arc::new(identity),
            transaction: None,
        }
    }

    /// Context used by background work that acts on nobody's behalf.
    #[must_use]
    pub fn system() -> Self {
        Self::default()
    }

    /// The identity of this flow.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Tenant id, if any.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.identity.tenant_id.as_deref()
    }

    /// User id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.identity.user_id.as_deref()
    }

    /// Request id, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.identity.request_id.as_deref()
    }

    /// The open transaction, if this context is inside a unit of work.
    #[must_use]
    pub fn transaction(&self) -> Option<&TransactionHandle> {
        self.transaction.as_ref()
    }

    /// Returns a copy of this context bound to `transaction`.
    #[must_use]
    pub fn with_transaction(&self, transaction: TransactionHandle) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            transaction: Some(transaction),
        }
    }

    /// Returns a copy of this context with the transaction detached.
    #[must_use]
    pub fn without_transaction(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            transaction: None,
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("identity", &self.identity)
            .field("transaction", &self.transaction.as_ref().map(|tx| tx.id()))
            .finish()
    }
}

//! Deny-by-default authorization.
//!
//! The message type is mapped to an abstract [`Action`] by its leading
//! verb (`CreateTenant` is a `Create`, `ListTenants` a `Read`), and a
//! pluggable [`PermissionChecker`] decides whether the identity may perform
//! that action on the message's subject.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::context::Identity;
use tessera_core::error::DomainError;
use tracing::{debug, warn};

use crate::context::CqrsExecutionContext;
use crate::error::DispatchError;
use crate::pipeline::{Middleware, Next, Output};

/// Abstract verb a message performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    /// Anything without a recognised verb.
    Manage,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Manage => "manage",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The leading PascalCase word of `message_type`.
fn leading_verb(message_type: &str) -> &str {
    let end = message_type
        .char_indices()
        .skip(1)
        .find(|(_, c)| c.is_uppercase())
        .map_or(message_type.len(), |(i, _)| i);
    &message_type[..end]
}

/// Maps a message type to its action by naming convention.
#[must_use]
pub fn action_for(message_type: &str) -> Action {
    match leading_verb(message_type) {
        "Create" | "Register" | "Add" | "Open" => Action::Create,
        "Get" | "List" | "Find" | "Search" | "Count" => Action::Read,
        "Update" | "Rename" | "Change" | "Set" | "Suspend" | "Reactivate" | "Assign" => {
            Action::Update
        }
        "Delete" | "Remove" | "Archive" | "Purge" => Action::Delete,
        _ => Action::Manage,
    }
}

/// Decides whether an identity may perform an action.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Whether `identity` may perform `action` through `message_type`.
    ///
    /// # Errors
    ///
    /// Returns an error when the decision cannot be made; the dispatch
    /// fails with it.
    async fn is_allowed(
        &self,
        identity: &Identity,
        action: Action,
        message_type: &str,
    ) -> Result<bool, DomainError>;
}

/// Allows every authenticated identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticatedOnly;

#[async_trait]
impl PermissionChecker for AuthenticatedOnly {
    async fn is_allowed(
        &self,
        identity: &Identity,
        _action: Action,
        _message_type: &str,
    ) -> Result<bool, DomainError> {
        Ok(identity.is_authenticated())
    }
}

/// Fixed allow list of actions, for wiring and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionChecker {
    allowed: HashSet<Action>,
}

impl StaticPermissionChecker {
    /// Allows every action.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::allowing([
            Action::Create,
            Action::Read,
            Action::Update,
            Action::Delete,
            Action::Manage,
        ])
    }

    /// Allows nothing.
    #[must_use]
    pub fn deny_all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allowing(actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            allowed: actions.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PermissionChecker for StaticPermissionChecker {
    async fn is_allowed(
        &self,
        _identity: &Identity,
        action: Action,
        _message_type: &str,
    ) -> Result<bool, DomainError> {
        Ok(self.allowed.contains(&action))
    }
}

/// Refuses unauthenticated callers, then consults the checker. Stores the
/// resolved [`Action`] in the context's extensions.
#[derive(Clone)]
pub struct AuthorizationMiddleware {
    checker: Arc<dyn PermissionChecker>,
}

impl fmt::Debug for AuthorizationMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationMiddleware").finish_non_exhaustive()
    }
}

impl Default for AuthorizationMiddleware {
    fn default() -> Self {
        Self::new(Arc::new(AuthenticatedOnly))
    }
}

impl AuthorizationMiddleware {
    #[must_use]
    pub fn new(checker: Arc<dyn PermissionChecker>) -> Self {
        Self { checker }
    }
}

#[async_trait]
impl Middleware for AuthorizationMiddleware {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn handle(
        &self,
        ctx: &mut CqrsExecutionContext,
        next: Next<'_>,
    ) -> Result<Output, DispatchError> {
        let message_type = ctx.message_type();
        let denied = |reason: String| {
            warn!(
                message_type,
                tenant_id = ctx.tenant_id(),
                user_id = ctx.user_id(),
                request_id = ctx.request_id(),
                %reason,
                "dispatch denied"
            );
            DispatchError::PermissionDenied {
                message_type: message_type.to_owned(),
                reason,
            }
        };

        if !ctx.identity().is_authenticated() {
            return Err(denied("caller is not authenticated".to_owned()));
        }
        let action = action_for(message_type);
        if !self
            .checker
            .is_allowed(ctx.identity(), action, message_type)
            .await?
        {
            return Err(denied(format!("{action} is not permitted")));
        }

        debug!(message_type, action = action.as_str(), "dispatch authorized");
        ctx.extensions_mut().insert(action);
        next.run(ctx).await
    }
}

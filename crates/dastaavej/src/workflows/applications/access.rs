//! Role and ownership checks, decided once per operation.

use super::domain::Application;
use crate::workflows::accounts::{Principal, Role};

/// Operations the guard decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Submit,
    View,
    Download,
    Transition,
    ReviewQueue,
}

impl Operation {
    pub const fn label(self) -> &'static str {
        match self {
            Operation::Submit => "submit",
            Operation::View => "view",
            Operation::Download => "download",
            Operation::Transition => "transition",
            Operation::ReviewQueue => "review",
        }
    }
}

/// Capacity in which an allowed principal acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Owner,
    Reviewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("account is awaiting verification")]
    Unverified,
    #[error("only {required} accounts may {}", .operation.label())]
    WrongRole {
        required: Role,
        operation: Operation,
    },
    #[error("application belongs to another citizen")]
    NotOwner,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGuard;

impl AccessGuard {
    /// Decide an operation that does not target an existing application
    /// (submission, drafts, the review queue).
    pub fn authorize(
        &self,
        principal: &Principal,
        operation: Operation,
    ) -> Result<Access, AccessDenied> {
        if !principal.verified {
            return Err(AccessDenied::Unverified);
        }

        match (principal.role, operation) {
            (Role::Citizen, Operation::Submit) => Ok(Access::Owner),
            (Role::Agency, Operation::ReviewQueue) => Ok(Access::Reviewer),
            (Role::Citizen, Operation::ReviewQueue | Operation::Transition) => {
                Err(AccessDenied::WrongRole {
                    required: Role::Agency,
                    operation,
                })
            }
            (Role::Agency, Operation::Submit) => Err(AccessDenied::WrongRole {
                required: Role::Citizen,
                operation,
            }),
            (Role::Citizen, Operation::View | Operation::Download) => Ok(Access::Owner),
            (Role::Agency, Operation::View | Operation::Download | Operation::Transition) => {
                Ok(Access::Reviewer)
            }
        }
    }

    /// Decide an operation against a specific application.
    pub fn authorize_on(
        &self,
        principal: &Principal,
        operation: Operation,
        application: &Application,
    ) -> Result<Access, AccessDenied> {
        let access = self.authorize(principal, operation)?;
        if access == Access::Owner && application.owner != principal.user_id {
            return Err(AccessDenied::NotOwner);
        }
        Ok(access)
    }
}

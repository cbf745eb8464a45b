//! Status state machine and the records each transition produces.
//!
//! `pending` is the only initial state; `approved` and `rejected` are terminal. Nothing
//! ever re-enters `pending`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::domain::{
    Application, ApplicationStatus, Notification, NotificationId, StatusUpdate,
};
use super::repository::TransitionCommit;
use crate::notify::MailMessage;
use crate::workflows::accounts::{User, UserId};

pub const STATUS_NOTIFICATION_TITLE: &str = "Application Status Updated";

impl ApplicationStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved | ApplicationStatus::Rejected
        )
    }

    /// Statuses reachable in one step from `self`.
    pub const fn allowed_transitions(self) -> &'static [ApplicationStatus] {
        match self {
            ApplicationStatus::Pending => &[
                ApplicationStatus::UnderReview,
                ApplicationStatus::Approved,
                ApplicationStatus::Rejected,
            ],
            ApplicationStatus::UnderReview => {
                &[ApplicationStatus::Approved, ApplicationStatus::Rejected]
            }
            ApplicationStatus::Approved | ApplicationStatus::Rejected => &[],
        }
    }

    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move application from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

/// Build the status change, audit entry, and citizen notification for one transition.
///
/// Nothing is written here; the store commits the plan and re-checks the edge against
/// the status it holds at commit time.
pub fn plan_transition(
    application: &Application,
    to: ApplicationStatus,
    comment: Option<String>,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<TransitionCommit, InvalidTransition> {
    let from = application.status;
    if !from.can_transition_to(to) {
        return Err(InvalidTransition { from, to });
    }

    let comment = comment
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    Ok(TransitionCommit {
        application_id: application.id,
        update: StatusUpdate {
            application_id: application.id,
            status: to,
            comment,
            updated_by: actor,
            updated_at: now,
        },
        notification: Notification {
            id: NotificationId(Uuid::new_v4()),
            user_id: application.owner,
            title: STATUS_NOTIFICATION_TITLE.to_string(),
            message: status_message(application, to),
            read: false,
            created_at: now,
        },
    })
}

pub fn status_message(application: &Application, status: ApplicationStatus) -> String {
    format!(
        "Your {} application ({}) status has been updated to {}.",
        application.kind,
        application.number,
        status.describe()
    )
}

/// Mail counterpart of the in-app notification.
pub fn status_mail(citizen: &User, commit: &TransitionCommit) -> MailMessage {
    let comment = commit
        .update
        .comment
        .as_deref()
        .unwrap_or("No comments provided");

    MailMessage {
        recipient: citizen.email.clone(),
        subject: commit.notification.title.clone(),
        body_text: format!(
            "Dear {},\n\n{}\n\nAdditional Comments: {}\n\nYou can check the details by logging into your Dastaavej dashboard.\n\nBest regards,\nDastaavej Team\n",
            citizen.username, commit.notification.message, comment
        ),
        body_html: None,
    }
}

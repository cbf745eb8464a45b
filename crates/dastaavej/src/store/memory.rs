//! In-process store implementing every repository trait.
//!
//! All state sits behind one mutex, so each trait call is a single transaction. Mutations
//! run against a copy of the state which replaces the live one only when the whole
//! change succeeded.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{check_documents, RepositoryError};
use crate::workflows::accounts::{
    Session, SessionRepository, TokenRedemption, User, UserId, UserRepository,
    VerificationToken, VerificationTokenRepository,
};
use crate::workflows::applications::{
    Application, ApplicationId, ApplicationNumber, ApplicationRecord, ApplicationRepository,
    ApplicationStatus, Document, DraftApplication, DraftId, DraftRepository, NewSubmission,
    Notification, StatusCounts, StatusUpdate, TransitionCommit,
};

#[derive(Debug, Clone, Default)]
struct PortalState {
    users: HashMap<UserId, User>,
    tokens: HashMap<String, VerificationToken>,
    sessions: HashMap<String, Session>,
    applications: HashMap<ApplicationId, Application>,
    documents: HashMap<ApplicationId, Vec<Document>>,
    history: HashMap<ApplicationId, Vec<StatusUpdate>>,
    notifications: Vec<Notification>,
    drafts: HashMap<DraftId, DraftApplication>,
}

impl PortalState {
    fn record(&self, application: &Application) -> ApplicationRecord {
        ApplicationRecord {
            application: application.clone(),
            documents: self
                .documents
                .get(&application.id)
                .cloned()
                .unwrap_or_default(),
            history: self
                .history
                .get(&application.id)
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn newest_first<'a>(
        applications: impl Iterator<Item = &'a Application>,
    ) -> Vec<Application> {
        let mut listed: Vec<Application> = applications.cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.number.0.cmp(&b.number.0)));
        listed
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<PortalState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, PortalState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }

    fn read<T>(&self, view: impl FnOnce(&PortalState) -> T) -> Result<T, RepositoryError> {
        let guard = self.lock()?;
        Ok(view(&guard))
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut PortalState) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        let outcome = apply(&mut next)?;
        *guard = next;
        Ok(outcome)
    }
}

impl ApplicationRepository for MemoryStore {
    fn insert_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<ApplicationRecord, RepositoryError> {
        check_documents(&submission)?;
        self.mutate(|state| {
            let NewSubmission {
                application,
                documents,
                consumed_draft,
            } = submission;

            if state.applications.contains_key(&application.id)
                || state.applications.values().any(|existing| {
                    existing.number.0.eq_ignore_ascii_case(&application.number.0)
                })
            {
                return Err(RepositoryError::Conflict);
            }
            if let Some(draft_id) = consumed_draft {
                state
                    .drafts
                    .remove(&draft_id)
                    .ok_or(RepositoryError::NotFound)?;
            }

            state.documents.insert(application.id, documents);
            state.applications.insert(application.id, application.clone());
            Ok(state.record(&application))
        })
    }

    fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<ApplicationRecord, RepositoryError> {
        self.mutate(|state| {
            let application = state
                .applications
                .get_mut(&commit.application_id)
                .ok_or(RepositoryError::NotFound)?;

            let current = application.status;
            if !current.can_transition_to(commit.update.status) {
                return Err(RepositoryError::StaleStatus { current });
            }

            application.status = commit.update.status;
            application.updated_at = commit.update.updated_at;
            let application = application.clone();

            state
                .history
                .entry(commit.application_id)
                .or_default()
                .push(commit.update);
            state.notifications.push(commit.notification);
            Ok(state.record(&application))
        })
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.read(|state| {
            state
                .applications
                .get(id)
                .map(|application| state.record(application))
        })
    }

    fn fetch_by_number(
        &self,
        number: &ApplicationNumber,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.read(|state| {
            state
                .applications
                .values()
                .find(|application| application.number.0.eq_ignore_ascii_case(&number.0))
                .map(|application| state.record(application))
        })
    }

    fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Application>, RepositoryError> {
        self.read(|state| {
            PortalState::newest_first(
                state
                    .applications
                    .values()
                    .filter(|application| application.owner == *owner),
            )
        })
    }

    fn list_by_status(
        &self,
        status: ApplicationStatus,
    ) -> Result<Vec<Application>, RepositoryError> {
        self.read(|state| {
            PortalState::newest_first(
                state
                    .applications
                    .values()
                    .filter(|application| application.status == status),
            )
        })
    }

    fn count_by_status(&self) -> Result<StatusCounts, RepositoryError> {
        self.read(|state| {
            state
                .applications
                .values()
                .map(|application| application.status)
                .collect()
        })
    }

    fn notifications_for(&self, user: &UserId) -> Result<Vec<Notification>, RepositoryError> {
        self.read(|state| {
            let mut notifications: Vec<Notification> = state
                .notifications
                .iter()
                .rev()
                .filter(|notification| notification.user_id == *user)
                .cloned()
                .collect();
            notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            notifications
        })
    }

    fn mark_notifications_read(&self, user: &UserId) -> Result<usize, RepositoryError> {
        self.mutate(|state| {
            let mut changed = 0;
            for notification in state
                .notifications
                .iter_mut()
                .filter(|notification| notification.user_id == *user && !notification.read)
            {
                notification.read = true;
                changed += 1;
            }
            Ok(changed)
        })
    }
}

impl DraftRepository for MemoryStore {
    fn insert_draft(&self, draft: DraftApplication) -> Result<(), RepositoryError> {
        self.mutate(|state| {
            if state.drafts.contains_key(&draft.id) {
                return Err(RepositoryError::Conflict);
            }
            state.drafts.insert(draft.id, draft);
            Ok(())
        })
    }

    fn fetch_draft(&self, id: &DraftId) -> Result<Option<DraftApplication>, RepositoryError> {
        self.read(|state| state.drafts.get(id).cloned())
    }

    fn purge_expired_drafts(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.mutate(|state| {
            let before = state.drafts.len();
            state.drafts.retain(|_, draft| !draft.is_expired(now));
            Ok(before - state.drafts.len())
        })
    }
}

impl UserRepository for MemoryStore {
    fn insert_user(
        &self,
        user: User,
        token: Option<VerificationToken>,
    ) -> Result<(), RepositoryError> {
        self.mutate(|state| {
            if state.users.contains_key(&user.id) {
                return Err(RepositoryError::Conflict);
            }
            if state
                .users
                .values()
                .any(|existing| existing.username == user.username)
            {
                return Err(RepositoryError::Constraint("username".to_string()));
            }
            if state
                .users
                .values()
                .any(|existing| existing.email.eq_ignore_ascii_case(&user.email))
            {
                return Err(RepositoryError::Constraint("email".to_string()));
            }

            if let Some(token) = token {
                state.tokens.insert(token.token_hash.clone(), token);
            }
            state.users.insert(user.id, user);
            Ok(())
        })
    }

    fn remove_user(&self, id: &UserId) -> Result<(), RepositoryError> {
        self.mutate(|state| {
            state.users.remove(id).ok_or(RepositoryError::NotFound)?;
            state.tokens.retain(|_, token| token.user_id != *id);
            state.sessions.retain(|_, session| session.user_id != *id);
            Ok(())
        })
    }

    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.read(|state| state.users.get(id).cloned())
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        self.read(|state| {
            state
                .users
                .values()
                .find(|user| user.username == username)
                .cloned()
        })
    }
}

impl VerificationTokenRepository for MemoryStore {
    fn redeem_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenRedemption, RepositoryError> {
        self.mutate(|state| {
            let Some(stored) = state.tokens.get_mut(token_hash) else {
                return Ok(TokenRedemption::Unknown);
            };
            if stored.consumed {
                return Ok(TokenRedemption::AlreadyConsumed);
            }
            if stored.is_expired(now) {
                return Ok(TokenRedemption::Expired);
            }

            let Some(user) = state.users.get_mut(&stored.user_id) else {
                return Ok(TokenRedemption::Unknown);
            };
            stored.consumed = true;
            user.verified = true;
            Ok(TokenRedemption::Redeemed(user.clone()))
        })
    }
}

impl SessionRepository for MemoryStore {
    fn insert_session(&self, session: Session) -> Result<(), RepositoryError> {
        self.mutate(|state| {
            if state.sessions.contains_key(&session.token_hash) {
                return Err(RepositoryError::Conflict);
            }
            state.sessions.insert(session.token_hash.clone(), session);
            Ok(())
        })
    }

    fn fetch_session(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError> {
        self.read(|state| state.sessions.get(token_hash).cloned())
    }

    fn remove_session(&self, token_hash: &str) -> Result<bool, RepositoryError> {
        self.mutate(|state| Ok(state.sessions.remove(token_hash).is_some()))
    }

    fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.mutate(|state| {
            let before = state.sessions.len();
            state.sessions.retain(|_, session| !session.is_expired(now));
            Ok(before - state.sessions.len())
        })
    }
}

use chrono::{DateTime, Utc};

use super::domain::{Session, TokenRedemption, User, UserId, VerificationToken};
use crate::store::RepositoryError;

pub trait UserRepository: Send + Sync {
    /// Inserts the account and its verification token (agency accounts) together.
    /// Fails with [`RepositoryError::Constraint`] naming the duplicated field.
    fn insert_user(
        &self,
        user: User,
        token: Option<VerificationToken>,
    ) -> Result<(), RepositoryError>;

    /// Removes an account and any tokens issued for it.
    fn remove_user(&self, id: &UserId) -> Result<(), RepositoryError>;

    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    fn user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;
}

pub trait VerificationTokenRepository: Send + Sync {
    /// Marks the token consumed and its account verified in one step.
    fn redeem_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenRedemption, RepositoryError>;
}

/// Sessions are keyed by the digest of their bearer token.
pub trait SessionRepository: Send + Sync {
    fn insert_session(&self, session: Session) -> Result<(), RepositoryError>;
    fn fetch_session(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError>;
    /// Returns whether a session was removed.
    fn remove_session(&self, token_hash: &str) -> Result<bool, RepositoryError>;
    /// Drops sessions that expired at or before `now`, returning how many went.
    fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError>;
}

/// Everything the account service needs from persistence.
pub trait AccountStore: UserRepository + VerificationTokenRepository + SessionRepository {}

impl<T> AccountStore for T where T: UserRepository + VerificationTokenRepository + SessionRepository {}

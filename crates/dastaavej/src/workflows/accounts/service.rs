use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{
    AccountView, Principal, Registration, Role, Session, TokenRedemption, User, UserId,
    VerificationToken,
};
use super::password::{
    hash_password, new_token, token_digest, verify_decoy, verify_password, PasswordHashError,
};
use super::repository::AccountStore;
use crate::config::PortalConfig;
use crate::notify::{MailMessage, Notifier, NotifyError};
use crate::store::RepositoryError;
use crate::workflows::applications::validation::looks_like_email;
use crate::workflows::applications::{FieldError, ValidationError};

const PASSWORD_SYMBOLS: &str = "!@#$%^&*(),.?\":{}|<>";

#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub verification_ttl: Duration,
    pub session_ttl: Duration,
    /// Recipient of agency verification requests.
    pub admin_email: String,
    /// Base URL used to build verification links.
    pub public_url: String,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            verification_ttl: Duration::hours(72),
            session_ttl: Duration::hours(24),
            admin_email: "admin@dastaavej.local".to_string(),
            public_url: "http://127.0.0.1:3000".to_string(),
        }
    }
}

impl From<&PortalConfig> for AccountSettings {
    fn from(config: &PortalConfig) -> Self {
        Self {
            verification_ttl: Duration::hours(config.verification_ttl_hours),
            session_ttl: Duration::hours(config.session_ttl_hours),
            admin_email: config.admin_email.clone(),
            public_url: config.public_url.clone(),
        }
    }
}

/// Outcome of a registration. The verification token is only surfaced to in-process
/// callers (operator tooling, tests); the HTTP layer never returns it.
#[derive(Debug, Clone)]
pub struct Registered {
    pub account: AccountView,
    pub verification_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub account: AccountView,
}

/// Resolves bearer tokens for the HTTP layer.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<Principal, AccountServiceError>;
}

pub struct AccountService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    settings: AccountSettings,
}

impl<R, N> AccountService<R, N>
where
    R: AccountStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, settings: AccountSettings) -> Self {
        Self {
            repository,
            notifier,
            settings,
        }
    }

    /// Citizens are active at once. Agency officials stay unverified until an
    /// administrator redeems the token mailed to them; if that mail cannot be sent the
    /// account is removed again.
    pub fn register(&self, registration: Registration) -> Result<Registered, AccountServiceError> {
        let registration = validate_registration(registration)?;
        if self
            .repository
            .user_by_username(&registration.username)?
            .is_some()
        {
            return Err(AccountServiceError::Duplicate("username"));
        }

        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            username: registration.username,
            email: registration.email,
            password_hash: hash_password(&registration.password)?,
            role: registration.role,
            government_id: registration.government_id,
            verified: registration.role == Role::Citizen,
            created_at: now,
        };
        let token = (user.role == Role::Agency).then(new_token);
        let stored_token = token.as_deref().map(|token| VerificationToken {
            token_hash: token_digest(token),
            user_id: user.id,
            issued_at: now,
            expires_at: now + self.settings.verification_ttl,
            consumed: false,
        });

        match self.repository.insert_user(user.clone(), stored_token) {
            Ok(()) => {}
            Err(RepositoryError::Constraint(field)) if field == "email" => {
                return Err(AccountServiceError::Duplicate("email"))
            }
            Err(RepositoryError::Constraint(_)) => {
                return Err(AccountServiceError::Duplicate("username"))
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(token) = &token {
            let request = self.verification_request(&user, token);
            if let Err(err) = self.notifier.send(request) {
                warn!(username = %user.username, error = %err, "verification request not sent; rolling back registration");
                if let Err(cleanup) = self.repository.remove_user(&user.id) {
                    warn!(user_id = %user.id, error = %cleanup, "unable to remove unverifiable account");
                }
                return Err(AccountServiceError::Notification(err));
            }
        }

        info!(user_id = %user.id, role = %user.role, "account registered");
        Ok(Registered {
            account: AccountView::from(&user),
            verification_token: token,
        })
    }

    fn verification_request(&self, user: &User, token: &str) -> MailMessage {
        let link = format!(
            "{}/api/v1/auth/verify-agency/{token}",
            self.settings.public_url.trim_end_matches('/')
        );
        MailMessage {
            recipient: self.settings.admin_email.clone(),
            subject: "New Agency Official Registration Verification".to_string(),
            body_text: format!(
                "A new agency official has registered and requires verification:\n\nUsername: {}\nEmail: {}\nGovernment ID: {}\n\nTo verify this registration, open the following link:\n{link}\n\nIf you did not expect this registration, please ignore this email.\n\nBest regards,\nDastaavej Team\n",
                user.username,
                user.email,
                user.government_id.as_deref().unwrap_or("not provided"),
            ),
            body_html: None,
        }
    }

    pub fn verify_agency(&self, token: &str) -> Result<AccountView, AccountServiceError> {
        let user = match self
            .repository
            .redeem_token(&token_digest(token), Utc::now())?
        {
            TokenRedemption::Redeemed(user) => user,
            TokenRedemption::Unknown => return Err(AccountServiceError::InvalidToken),
            TokenRedemption::Expired => return Err(AccountServiceError::TokenExpired),
            TokenRedemption::AlreadyConsumed => return Err(AccountServiceError::TokenConsumed),
        };
        info!(user_id = %user.id, "agency account verified");

        let confirmation = MailMessage {
            recipient: user.email.clone(),
            subject: "Your Agency Account has been Verified - Dastaavej".to_string(),
            body_text: format!(
                "Dear {},\n\nYour agency official account on Dastaavej has been verified. You can now log in and access the agency dashboard.\n\nBest regards,\nDastaavej Team\n",
                user.username
            ),
            body_html: None,
        };
        if let Err(err) = self.notifier.send(confirmation) {
            warn!(user_id = %user.id, error = %err, "verification confirmation not delivered");
        }

        Ok(AccountView::from(&user))
    }

    /// Unknown usernames still pay for one password verification.
    pub fn login(&self, username: &str, password: &str) -> Result<LoginSession, AccountServiceError> {
        let user = match self.repository.user_by_username(username.trim())? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            Some(_) => return Err(AccountServiceError::InvalidCredentials),
            None => {
                verify_decoy(password);
                return Err(AccountServiceError::InvalidCredentials);
            }
        };
        if !user.verified {
            return Err(AccountServiceError::PendingVerification);
        }

        let now = Utc::now();
        match self.repository.purge_expired_sessions(now) {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "expired sessions removed"),
            Err(err) => warn!(error = %err, "unable to purge expired sessions"),
        }

        let token = new_token();
        let session = Session {
            token_hash: token_digest(&token),
            user_id: user.id,
            created_at: now,
            expires_at: now + self.settings.session_ttl,
        };
        self.repository.insert_session(session.clone())?;
        info!(user_id = %user.id, "session opened");

        Ok(LoginSession {
            token,
            expires_at: session.expires_at,
            account: AccountView::from(&user),
        })
    }

    pub fn logout(&self, token: &str) -> Result<(), AccountServiceError> {
        if self.repository.remove_session(&token_digest(token))? {
            Ok(())
        } else {
            Err(AccountServiceError::Unauthenticated)
        }
    }

    pub fn account(&self, token: &str) -> Result<AccountView, AccountServiceError> {
        self.session_user(token).map(|user| AccountView::from(&user))
    }

    /// Owner of a live session; expired sessions count as signed out.
    fn session_user(&self, token: &str) -> Result<User, AccountServiceError> {
        let session = self
            .repository
            .fetch_session(&token_digest(token))?
            .filter(|session| !session.is_expired(Utc::now()))
            .ok_or(AccountServiceError::Unauthenticated)?;
        self.repository
            .fetch_user(&session.user_id)?
            .ok_or(AccountServiceError::Unauthenticated)
    }
}

impl<R, N> Authenticator for AccountService<R, N>
where
    R: AccountStore + 'static,
    N: Notifier + 'static,
{
    fn authenticate(&self, token: &str) -> Result<Principal, AccountServiceError> {
        self.session_user(token).map(|user| user.principal())
    }
}

fn validate_registration(registration: Registration) -> Result<Registration, ValidationError> {
    let mut errors = Vec::new();
    let username = registration.username.trim().to_string();
    let email = registration.email.trim().to_string();
    let government_id = registration
        .government_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    if username.chars().count() < 8
        || !username.chars().any(|c| c.is_ascii_uppercase())
        || !username.chars().any(|c| c.is_ascii_lowercase())
        || !username.chars().any(|c| c.is_ascii_digit())
    {
        errors.push(FieldError::new(
            "username",
            "must be at least 8 characters with an uppercase letter, a lowercase letter, and a digit",
        ));
    }
    if !looks_like_email(&email) {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }

    let password = &registration.password;
    let length = password.chars().count();
    if !(8..=20).contains(&length)
        || !password.chars().any(|c| c.is_ascii_uppercase())
        || !password.chars().any(|c| c.is_ascii_lowercase())
        || !password.chars().any(|c| c.is_ascii_digit())
        || !password.chars().any(|c| PASSWORD_SYMBOLS.contains(c))
    {
        errors.push(FieldError::new(
            "password",
            "must be 8-20 characters with upper and lower case letters, a digit, and a symbol",
        ));
    }
    if !username.is_empty()
        && password
            .to_lowercase()
            .contains(&username.to_lowercase())
    {
        errors.push(FieldError::new("password", "must not contain the username"));
    }
    if registration.confirm_password != registration.password {
        errors.push(FieldError::new("confirm_password", "passwords must match"));
    }
    if registration.role == Role::Agency && government_id.is_none() {
        errors.push(FieldError::new(
            "government_id",
            "required for agency officials",
        ));
    }

    if !errors.is_empty() {
        return Err(ValidationError::Fields(errors));
    }
    Ok(Registration {
        username,
        email,
        government_id,
        ..registration
    })
}

#[derive(Debug, thiserror::Error)]
pub enum AccountServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} is already registered")]
    Duplicate(&'static str),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("agency account is pending verification")]
    PendingVerification,
    #[error("authentication required")]
    Unauthenticated,
    #[error("invalid verification link")]
    InvalidToken,
    #[error("verification link has expired")]
    TokenExpired,
    #[error("verification link has already been used")]
    TokenConsumed,
    #[error("verification request could not be sent: {0}")]
    Notification(#[source] NotifyError),
    #[error(transparent)]
    Password(#[from] PasswordHashError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

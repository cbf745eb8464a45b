//! Portal accounts: registration, agency verification, and bearer sessions.

pub mod domain;
pub mod password;
pub mod repository;
pub mod router;
pub mod service;

pub use domain::{
    AccountView, Principal, Registration, Role, Session, TokenRedemption, User, UserId,
    VerificationToken,
};
pub use repository::{AccountStore, SessionRepository, UserRepository, VerificationTokenRepository};
pub use router::account_router;
pub use service::{
    AccountService, AccountServiceError, AccountSettings, Authenticator, LoginSession,
    Registered,
};

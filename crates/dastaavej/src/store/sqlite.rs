//! SQLite store backing the running portal.
//!
//! Uniqueness lives in the schema (`users.username`, `users.email`, `applications.number`)
//! and every multi-row write runs in one `BEGIN IMMEDIATE` transaction. Status transitions
//! are a compare-and-set `UPDATE` guarded by the statuses allowed to reach the target.
//!
//! The repository traits are synchronous, so calls block on the runtime captured at
//! connect time and must run on a blocking thread (`tokio::task::spawn_blocking`).
//!
//! Timestamps are stored as RFC 3339 UTC text, which sorts chronologically.

use std::future::Future;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tokio::runtime::Handle;
use tracing::{debug, info};
use uuid::Uuid;

use super::{check_documents, RepositoryError};
use crate::storage::BlobId;
use crate::workflows::accounts::{
    Role, Session, SessionRepository, TokenRedemption, User, UserId, UserRepository,
    VerificationToken, VerificationTokenRepository,
};
use crate::workflows::applications::{
    ApplicantDetails, Application, ApplicationId, ApplicationNumber, ApplicationRecord,
    ApplicationRepository, ApplicationStatus, Document, DocumentId, DocumentKind, DocumentType,
    DraftApplication, DraftId, DraftRepository, NewSubmission, Notification, NotificationId,
    StatusCounts, StatusUpdate, TransitionCommit,
};

const FILE_POOL_SIZE: u32 = 4;
const WRITE: &str = "BEGIN IMMEDIATE";

pub struct SqliteStore {
    pool: SqlitePool,
    handle: Handle,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("connections", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens the database at `path`, creating it when missing, and applies migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_POOL_SIZE)
            .connect_with(options)
            .await
            .map_err(|err| {
                RepositoryError::Unavailable(format!("unable to open {}: {err}", path.display()))
            })?;

        let store = Self::migrated(pool).await?;
        info!(path = %path.display(), "portal database opened");
        Ok(store)
    }

    /// Private database that lives exactly as long as the store.
    pub async fn in_memory() -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        // Every connection would get its own empty database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::migrated(pool).await?;
        info!("in-memory portal database opened");
        Ok(store)
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, RepositoryError> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| RepositoryError::Unavailable(format!("migration failed: {err}")))?;
        Ok(Self {
            pool,
            handle: Handle::current(),
        })
    }

    fn run<T>(
        &self,
        work: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, RepositoryError> {
        self.handle.block_on(work)
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err.as_database_error() {
            Some(database) if database.is_unique_violation() => {
                let message = database.message();
                if message.contains("users.username") {
                    RepositoryError::Constraint("username".to_string())
                } else if message.contains("users.email") {
                    RepositoryError::Constraint("email".to_string())
                } else {
                    RepositoryError::Conflict
                }
            }
            _ => RepositoryError::Unavailable(err.to_string()),
        }
    }
}

fn corrupt(column: &str, raw: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("stored {column} '{raw}' is not readable"))
}

fn parse_uuid(column: &str, raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|_| corrupt(column, raw))
}

fn parse_status(raw: &str) -> Result<ApplicationStatus, RepositoryError> {
    ApplicationStatus::from_label(raw).ok_or_else(|| corrupt("status", raw))
}

fn parse_kind(raw: &str) -> Result<DocumentKind, RepositoryError> {
    DocumentKind::from_label(raw).ok_or_else(|| corrupt("kind", raw))
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    government_id: Option<String>,
    verified: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId(parse_uuid("user id", &row.id)?),
            role: Role::from_label(&row.role).ok_or_else(|| corrupt("role", &row.role))?,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            government_id: row.government_id,
            verified: row.verified,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct TokenRow {
    token_hash: String,
    user_id: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    consumed: bool,
}

impl TryFrom<TokenRow> for VerificationToken {
    type Error = RepositoryError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(VerificationToken {
            user_id: UserId(parse_uuid("user id", &row.user_id)?),
            token_hash: row.token_hash,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            consumed: row.consumed,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    token_hash: String,
    user_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = RepositoryError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            user_id: UserId(parse_uuid("user id", &row.user_id)?),
            token_hash: row.token_hash,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[derive(FromRow)]
struct ApplicationRow {
    id: String,
    number: String,
    owner: String,
    kind: String,
    status: String,
    applicant: Json<ApplicantDetails>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = RepositoryError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: ApplicationId(parse_uuid("application id", &row.id)?),
            owner: UserId(parse_uuid("owner", &row.owner)?),
            kind: parse_kind(&row.kind)?,
            status: parse_status(&row.status)?,
            number: ApplicationNumber(row.number),
            applicant: row.applicant.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    application_id: String,
    document_type: String,
    blob_id: String,
    filename: String,
    mime_type: String,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = RepositoryError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Document {
            id: DocumentId(parse_uuid("document id", &row.id)?),
            application_id: ApplicationId(parse_uuid("application id", &row.application_id)?),
            document_type: DocumentType::from_label(&row.document_type)
                .ok_or_else(|| corrupt("document type", &row.document_type))?,
            blob: BlobId(row.blob_id),
            filename: row.filename,
            mime_type: row.mime_type,
            uploaded_at: row.uploaded_at,
        })
    }
}

#[derive(FromRow)]
struct StatusUpdateRow {
    application_id: String,
    status: String,
    comment: Option<String>,
    updated_by: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StatusUpdateRow> for StatusUpdate {
    type Error = RepositoryError;

    fn try_from(row: StatusUpdateRow) -> Result<Self, Self::Error> {
        Ok(StatusUpdate {
            application_id: ApplicationId(parse_uuid("application id", &row.application_id)?),
            status: parse_status(&row.status)?,
            updated_by: UserId(parse_uuid("updated by", &row.updated_by)?),
            comment: row.comment,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    title: String,
    message: String,
    read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = RepositoryError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: NotificationId(parse_uuid("notification id", &row.id)?),
            user_id: UserId(parse_uuid("user id", &row.user_id)?),
            title: row.title,
            message: row.message,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct DraftRow {
    id: String,
    owner: String,
    kind: String,
    applicant: Json<ApplicantDetails>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<DraftRow> for DraftApplication {
    type Error = RepositoryError;

    fn try_from(row: DraftRow) -> Result<Self, Self::Error> {
        Ok(DraftApplication {
            id: DraftId(parse_uuid("draft id", &row.id)?),
            owner: UserId(parse_uuid("owner", &row.owner)?),
            kind: parse_kind(&row.kind)?,
            applicant: row.applicant.0,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>, RepositoryError>
where
    T: TryFrom<R, Error = RepositoryError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const APPLICATION_COLUMNS: &str =
    "id, number, owner, kind, status, applicant, created_at, updated_at";

async fn load_record(
    conn: &mut SqliteConnection,
    application: Application,
) -> Result<ApplicationRecord, RepositoryError> {
    let id = application.id.0.to_string();
    let documents: Vec<DocumentRow> = sqlx::query_as(
        r#"
        SELECT id, application_id, document_type, blob_id, filename, mime_type, uploaded_at
        FROM documents
        WHERE application_id = ?
        ORDER BY rowid
        "#,
    )
    .bind(&id)
    .fetch_all(&mut *conn)
    .await?;
    let history: Vec<StatusUpdateRow> = sqlx::query_as(
        r#"
        SELECT application_id, status, comment, updated_by, updated_at
        FROM status_updates
        WHERE application_id = ?
        ORDER BY seq
        "#,
    )
    .bind(&id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ApplicationRecord {
        application,
        documents: convert(documents)?,
        history: convert(history)?,
    })
}

async fn insert_notification(
    conn: &mut SqliteConnection,
    notification: &Notification,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, title, message, read, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(notification.id.0.to_string())
    .bind(notification.user_id.0.to_string())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.read)
    .bind(notification.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl SqliteStore {
    async fn record_where(
        &self,
        filter: &str,
        value: String,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let row: Option<ApplicationRow> = sqlx::query_as(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE {filter} = ?"
        ))
        .bind(value)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some(load_record(&mut conn, row.try_into()?).await?)),
            None => Ok(None),
        }
    }

    async fn applications_where(
        &self,
        filter: &str,
        value: String,
    ) -> Result<Vec<Application>, RepositoryError> {
        let rows: Vec<ApplicationRow> = sqlx::query_as(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE {filter} = ? \
             ORDER BY created_at DESC, number"
        ))
        .bind(value)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }
}

impl ApplicationRepository for SqliteStore {
    fn insert_submission(
        &self,
        submission: NewSubmission,
    ) -> Result<ApplicationRecord, RepositoryError> {
        check_documents(&submission)?;
        let NewSubmission {
            application,
            documents,
            consumed_draft,
        } = submission;

        self.run(async {
            let mut tx = self.pool.begin_with(WRITE).await?;
            sqlx::query(
                r#"
                INSERT INTO applications (id, number, owner, kind, status, applicant, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(application.id.0.to_string())
            .bind(&application.number.0)
            .bind(application.owner.0.to_string())
            .bind(application.kind.label())
            .bind(application.status.label())
            .bind(Json(&application.applicant))
            .bind(application.created_at)
            .bind(application.updated_at)
            .execute(&mut *tx)
            .await?;

            if let Some(draft_id) = consumed_draft {
                let removed = sqlx::query("DELETE FROM drafts WHERE id = ?")
                    .bind(draft_id.0.to_string())
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                if removed == 0 {
                    return Err(RepositoryError::NotFound);
                }
            }

            for document in &documents {
                sqlx::query(
                    r#"
                    INSERT INTO documents (id, application_id, document_type, blob_id, filename, mime_type, uploaded_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(document.id.0.to_string())
                .bind(document.application_id.0.to_string())
                .bind(document.document_type.label())
                .bind(&document.blob.0)
                .bind(&document.filename)
                .bind(&document.mime_type)
                .bind(document.uploaded_at)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            debug!(number = %application.number, "submission committed");
            Ok(ApplicationRecord {
                application,
                documents,
                history: Vec::new(),
            })
        })
    }

    fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let target = commit.update.status;
        let id = commit.application_id.0.to_string();

        self.run(async {
            let mut tx = self.pool.begin_with(WRITE).await?;

            let mut update = QueryBuilder::<Sqlite>::new("UPDATE applications SET status = ");
            update
                .push_bind(target.label())
                .push(", updated_at = ")
                .push_bind(commit.update.updated_at)
                .push(" WHERE id = ")
                .push_bind(id.as_str())
                .push(" AND status IN (");
            let mut sources = update.separated(", ");
            for status in ApplicationStatus::ALL
                .into_iter()
                .filter(|status| status.can_transition_to(target))
            {
                sources.push_bind(status.label());
            }
            update.push(")");
            let changed = update.build().execute(&mut *tx).await?.rows_affected();

            if changed == 0 {
                let current: Option<String> =
                    sqlx::query_scalar("SELECT status FROM applications WHERE id = ?")
                        .bind(id.as_str())
                        .fetch_optional(&mut *tx)
                        .await?;
                return match current {
                    Some(current) => Err(RepositoryError::StaleStatus {
                        current: parse_status(&current)?,
                    }),
                    None => Err(RepositoryError::NotFound),
                };
            }

            sqlx::query(
                r#"
                INSERT INTO status_updates (application_id, status, comment, updated_by, updated_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.as_str())
            .bind(target.label())
            .bind(commit.update.comment.as_deref())
            .bind(commit.update.updated_by.0.to_string())
            .bind(commit.update.updated_at)
            .execute(&mut *tx)
            .await?;
            insert_notification(&mut tx, &commit.notification).await?;

            let row: ApplicationRow = sqlx::query_as(&format!(
                "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?"
            ))
            .bind(id.as_str())
            .fetch_one(&mut *tx)
            .await?;
            let record = load_record(&mut tx, row.try_into()?).await?;

            tx.commit().await?;
            Ok(record)
        })
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.run(self.record_where("id", id.0.to_string()))
    }

    fn fetch_by_number(
        &self,
        number: &ApplicationNumber,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.run(self.record_where("number", number.0.clone()))
    }

    fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Application>, RepositoryError> {
        self.run(self.applications_where("owner", owner.0.to_string()))
    }

    fn list_by_status(
        &self,
        status: ApplicationStatus,
    ) -> Result<Vec<Application>, RepositoryError> {
        self.run(self.applications_where("status", status.label().to_string()))
    }

    fn count_by_status(&self) -> Result<StatusCounts, RepositoryError> {
        self.run(async {
            let rows: Vec<(String, i64)> =
                sqlx::query_as("SELECT status, COUNT(*) FROM applications GROUP BY status")
                    .fetch_all(&self.pool)
                    .await?;

            let mut counts = StatusCounts::default();
            for (status, count) in rows {
                let count = usize::try_from(count).map_err(|_| corrupt("count", &status))?;
                counts.add(parse_status(&status)?, count);
            }
            Ok(counts)
        })
    }

    fn notifications_for(&self, user: &UserId) -> Result<Vec<Notification>, RepositoryError> {
        self.run(async {
            let rows: Vec<NotificationRow> = sqlx::query_as(
                r#"
                SELECT id, user_id, title, message, read, created_at
                FROM notifications
                WHERE user_id = ?
                ORDER BY created_at DESC, seq DESC
                "#,
            )
            .bind(user.0.to_string())
            .fetch_all(&self.pool)
            .await?;
            convert(rows)
        })
    }

    fn mark_notifications_read(&self, user: &UserId) -> Result<usize, RepositoryError> {
        self.run(async {
            let changed = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
                .bind(user.0.to_string())
                .execute(&self.pool)
                .await?
                .rows_affected();
            Ok(changed as usize)
        })
    }
}

impl DraftRepository for SqliteStore {
    fn insert_draft(&self, draft: DraftApplication) -> Result<(), RepositoryError> {
        self.run(async {
            sqlx::query(
                r#"
                INSERT INTO drafts (id, owner, kind, applicant, created_at, expires_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(draft.id.0.to_string())
            .bind(draft.owner.0.to_string())
            .bind(draft.kind.label())
            .bind(Json(&draft.applicant))
            .bind(draft.created_at)
            .bind(draft.expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn fetch_draft(&self, id: &DraftId) -> Result<Option<DraftApplication>, RepositoryError> {
        self.run(async {
            let row: Option<DraftRow> = sqlx::query_as(
                r#"
                SELECT id, owner, kind, applicant, created_at, expires_at
                FROM drafts
                WHERE id = ?
                "#,
            )
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;
            row.map(DraftApplication::try_from).transpose()
        })
    }

    fn purge_expired_drafts(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.run(async {
            let removed = sqlx::query("DELETE FROM drafts WHERE expires_at <= ?")
                .bind(now)
                .execute(&self.pool)
                .await?
                .rows_affected();
            Ok(removed as usize)
        })
    }
}

impl UserRepository for SqliteStore {
    fn insert_user(
        &self,
        user: User,
        token: Option<VerificationToken>,
    ) -> Result<(), RepositoryError> {
        self.run(async {
            let mut tx = self.pool.begin_with(WRITE).await?;
            sqlx::query(
                r#"
                INSERT INTO users (id, username, email, password_hash, role, government_id, verified, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(user.id.0.to_string())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.label())
            .bind(user.government_id.as_deref())
            .bind(user.verified)
            .bind(user.created_at)
            .execute(&mut *tx)
            .await?;

            if let Some(token) = &token {
                sqlx::query(
                    r#"
                    INSERT INTO verification_tokens (token_hash, user_id, issued_at, expires_at, consumed)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&token.token_hash)
                .bind(token.user_id.0.to_string())
                .bind(token.issued_at)
                .bind(token.expires_at)
                .bind(token.consumed)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        })
    }

    fn remove_user(&self, id: &UserId) -> Result<(), RepositoryError> {
        self.run(async {
            let removed = sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id.0.to_string())
                .execute(&self.pool)
                .await?
                .rows_affected();
            if removed == 0 {
                return Err(RepositoryError::NotFound);
            }
            Ok(())
        })
    }

    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.run(async {
            let row: Option<UserRow> = sqlx::query_as(
                r#"
                SELECT id, username, email, password_hash, role, government_id, verified, created_at
                FROM users
                WHERE id = ?
                "#,
            )
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await?;
            row.map(User::try_from).transpose()
        })
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        self.run(async {
            let row: Option<UserRow> = sqlx::query_as(
                r#"
                SELECT id, username, email, password_hash, role, government_id, verified, created_at
                FROM users
                WHERE username = ?
                "#,
            )
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
            row.map(User::try_from).transpose()
        })
    }
}

impl VerificationTokenRepository for SqliteStore {
    fn redeem_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenRedemption, RepositoryError> {
        self.run(async {
            let mut tx = self.pool.begin_with(WRITE).await?;
            let stored: Option<TokenRow> = sqlx::query_as(
                r#"
                SELECT token_hash, user_id, issued_at, expires_at, consumed
                FROM verification_tokens
                WHERE token_hash = ?
                "#,
            )
            .bind(token_hash)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(stored) = stored.map(VerificationToken::try_from).transpose()? else {
                return Ok(TokenRedemption::Unknown);
            };
            if stored.consumed {
                return Ok(TokenRedemption::AlreadyConsumed);
            }
            if stored.is_expired(now) {
                return Ok(TokenRedemption::Expired);
            }

            sqlx::query("UPDATE verification_tokens SET consumed = 1 WHERE token_hash = ?")
                .bind(token_hash)
                .execute(&mut *tx)
                .await?;
            let user_id = stored.user_id.0.to_string();
            sqlx::query("UPDATE users SET verified = 1 WHERE id = ?")
                .bind(&user_id)
                .execute(&mut *tx)
                .await?;
            let user: Option<UserRow> = sqlx::query_as(
                r#"
                SELECT id, username, email, password_hash, role, government_id, verified, created_at
                FROM users
                WHERE id = ?
                "#,
            )
            .bind(&user_id)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(user) = user.map(User::try_from).transpose()? else {
                return Ok(TokenRedemption::Unknown);
            };

            tx.commit().await?;
            Ok(TokenRedemption::Redeemed(user))
        })
    }
}

impl SessionRepository for SqliteStore {
    fn insert_session(&self, session: Session) -> Result<(), RepositoryError> {
        self.run(async {
            sqlx::query(
                r#"
                INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&session.token_hash)
            .bind(session.user_id.0.to_string())
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn fetch_session(&self, token_hash: &str) -> Result<Option<Session>, RepositoryError> {
        self.run(async {
            let row: Option<SessionRow> = sqlx::query_as(
                r#"
                SELECT token_hash, user_id, created_at, expires_at
                FROM sessions
                WHERE token_hash = ?
                "#,
            )
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
            row.map(Session::try_from).transpose()
        })
    }

    fn remove_session(&self, token_hash: &str) -> Result<bool, RepositoryError> {
        self.run(async {
            let removed = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
                .bind(token_hash)
                .execute(&self.pool)
                .await?
                .rows_affected();
            Ok(removed > 0)
        })
    }

    fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.run(async {
            let removed = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
                .bind(now)
                .execute(&self.pool)
                .await?
                .rows_affected();
            Ok(removed as usize)
        })
    }
}

use dastaavej::config::{PortalConfig, StorageConfig};
use dastaavej::error::AppError;
use dastaavej::notify::{Notifier, TracingNotifier};
use dastaavej::storage::{
    BlobId, GoogleDriveStorage, MemoryStorage, StorageError, StorageGateway, UnavailableStorage,
};
use dastaavej::store::{PortalStore, SqliteStore};
use dastaavej::workflows::accounts::{AccountService, AccountSettings};
use dastaavej::workflows::applications::{ApplicationService, ApplicationSettings};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

/// Sender recorded on mail logged by the tracing notifier.
pub(crate) const TRACING_SENDER: &str = "noreply@dastaavej.local";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Storage backend chosen at start-up.
#[derive(Debug)]
pub(crate) enum PortalStorage {
    Drive(GoogleDriveStorage),
    Memory(MemoryStorage),
    Unavailable(UnavailableStorage),
}

impl PortalStorage {
    pub(crate) fn backend(&self) -> &'static str {
        match self {
            PortalStorage::Drive(_) => "google_drive",
            PortalStorage::Memory(_) => "memory",
            PortalStorage::Unavailable(_) => "unavailable",
        }
    }

    fn gateway(&self) -> &dyn StorageGateway {
        match self {
            PortalStorage::Drive(storage) => storage,
            PortalStorage::Memory(storage) => storage,
            PortalStorage::Unavailable(storage) => storage,
        }
    }
}

impl StorageGateway for PortalStorage {
    fn put(&self, bytes: &[u8], name: &str, mime_type: &str) -> Result<BlobId, StorageError> {
        self.gateway().put(bytes, name, mime_type)
    }

    fn get(&self, blob: &BlobId) -> Result<Vec<u8>, StorageError> {
        self.gateway().get(blob)
    }

    fn preview_link(&self, blob: &BlobId) -> Result<Option<String>, StorageError> {
        self.gateway().preview_link(blob)
    }

    fn discard(&self, blob: &BlobId) -> Result<(), StorageError> {
        self.gateway().discard(blob)
    }
}

/// Drive when credentials are configured; a failing stand-in when Drive cannot be
/// reached, so submissions fail cleanly instead of the server refusing to start.
pub(crate) async fn connect_storage(config: &StorageConfig) -> PortalStorage {
    let Some(credentials) = config.drive_credentials.as_deref() else {
        warn!("GOOGLE_DRIVE_CREDENTIALS is unset; uploads are kept in memory only");
        return PortalStorage::Memory(MemoryStorage::new());
    };

    match GoogleDriveStorage::connect(credentials, config.drive_folder_id.clone()).await {
        Ok(storage) => {
            info!(folder = ?config.drive_folder_id, "google drive storage connected");
            PortalStorage::Drive(storage)
        }
        Err(err) => {
            warn!(error = %err, "google drive storage unavailable; uploads will be refused");
            PortalStorage::Unavailable(UnavailableStorage::new(err.to_string()))
        }
    }
}

/// SQLite database at the configured path, or a private in-memory one when unset.
pub(crate) async fn open_store(config: &PortalConfig) -> Result<Arc<SqliteStore>, AppError> {
    let store = match &config.data_path {
        Some(path) => SqliteStore::open(path).await?,
        None => {
            warn!("DASTAAVEJ_DATA_PATH is unset; portal data lives only as long as this process");
            SqliteStore::in_memory().await?
        }
    };
    Ok(Arc::new(store))
}

/// Services sharing one store and notifier.
pub(crate) struct Portal<R, S, N> {
    pub(crate) accounts: Arc<AccountService<R, N>>,
    pub(crate) applications: Arc<ApplicationService<R, S, N>>,
}

impl<R, S, N> Portal<R, S, N>
where
    R: PortalStore,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    pub(crate) fn assemble(
        config: &PortalConfig,
        store: Arc<R>,
        storage: Arc<S>,
        notifier: Arc<N>,
    ) -> Self {
        let accounts = AccountService::new(
            Arc::clone(&store),
            Arc::clone(&notifier),
            AccountSettings::from(config),
        );
        let applications =
            ApplicationService::new(store, storage, notifier, ApplicationSettings::from(config));

        Self {
            accounts: Arc::new(accounts),
            applications: Arc::new(applications),
        }
    }
}

pub(crate) fn tracing_notifier() -> Arc<TracingNotifier> {
    Arc::new(TracingNotifier::new(TRACING_SENDER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_backend_refuses_every_call() {
        let storage = PortalStorage::Unavailable(UnavailableStorage::new("no credentials"));
        assert_eq!(storage.backend(), "unavailable");
        assert!(matches!(
            storage.put(b"bytes", "photo.jpg", "image/jpeg"),
            Err(StorageError::Unavailable(_))
        ));
    }

    #[test]
    fn memory_backend_round_trips_through_the_enum() {
        let storage = PortalStorage::Memory(MemoryStorage::new());
        let blob = storage
            .put(b"%PDF-1.4", "form.pdf", "application/pdf")
            .expect("memory put succeeds");
        assert_eq!(storage.get(&blob).expect("blob exists"), b"%PDF-1.4".to_vec());
        storage.discard(&blob).expect("discard succeeds");
        assert!(storage.get(&blob).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn store_without_a_path_is_private_and_empty() {
        use dastaavej::workflows::accounts::UserRepository;

        let config = PortalConfig {
            data_path: None,
            max_upload_bytes: 1024 * 1024,
            draft_ttl_minutes: 60,
            verification_ttl_hours: 72,
            session_ttl_hours: 24,
            admin_email: "admin@dastaavej.local".to_string(),
            public_url: "http://127.0.0.1:3000".to_string(),
        };
        let store = open_store(&config).await.expect("in-memory database opens");
        let found = tokio::task::spawn_blocking(move || store.user_by_username("nobody"))
            .await
            .expect("lookup runs")
            .expect("lookup succeeds");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn unconfigured_storage_falls_back_to_memory() {
        let storage = connect_storage(&StorageConfig {
            drive_credentials: None,
            drive_folder_id: None,
        })
        .await;
        assert_eq!(storage.backend(), "memory");
    }

    #[tokio::test]
    async fn unreadable_credentials_leave_storage_unavailable() {
        let storage = connect_storage(&StorageConfig {
            drive_credentials: Some("/nonexistent/dastaavej-drive-key.json".into()),
            drive_folder_id: Some("folder".to_string()),
        })
        .await;
        assert_eq!(storage.backend(), "unavailable");
    }
}

use std::io::Cursor;
use std::path::Path;

use google_drive3::api::{File, Permission, Scope};
use google_drive3::{hyper_rustls, hyper_util, yup_oauth2, DriveHub};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::warn;

use super::{BlobId, StorageError, StorageGateway};

pub type DriveConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Drive storage wired with service-account credentials and rustls.
pub type GoogleDriveStorage = GoogleDriveClient<DriveConnector>;

/// Thin wrapper around the generated google-drive3 client exposing the synchronous
/// [`StorageGateway`] contract.
///
/// Calls block on the captured runtime handle, so they must run on a blocking thread
/// (`tokio::task::spawn_blocking`), never directly on an async worker.
pub struct GoogleDriveClient<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    hub: DriveHub<C>,
    handle: Handle,
    folder_id: Option<String>,
}

impl<C> GoogleDriveClient<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    pub fn new(hub: DriveHub<C>, handle: Handle, folder_id: Option<String>) -> Self {
        Self {
            hub,
            handle,
            folder_id,
        }
    }

    fn share_with_link(&self, file_id: &str) -> Result<(), StorageError> {
        let permission = Permission {
            type_: Some("anyone".to_string()),
            role: Some("reader".to_string()),
            ..Permission::default()
        };

        self.handle
            .block_on(async {
                self.hub
                    .permissions()
                    .create(permission, file_id)
                    .param("fields", "id")
                    .supports_all_drives(true)
                    .add_scope(Scope::Full)
                    .doit()
                    .await
            })
            .map_err(|err| classify(&err, None))?;
        Ok(())
    }
}

/// Sort Drive failures into transient outages, missing files, and hard failures.
fn classify(err: &google_drive3::Error, blob: Option<&BlobId>) -> StorageError {
    use google_drive3::Error as DriveError;

    let status = match err {
        DriveError::HttpError(_) | DriveError::Io(_) | DriveError::MissingToken(_) => {
            return StorageError::Unavailable(err.to_string());
        }
        DriveError::Failure(response) => Some(response.status().as_u16()),
        DriveError::BadRequest(body) => body
            .pointer("/error/code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok()),
        _ => None,
    };

    match (status, blob) {
        (Some(404), Some(blob)) => StorageError::NotFound(blob.clone()),
        (Some(code), _) if code == 429 || code >= 500 => StorageError::Unavailable(err.to_string()),
        _ => StorageError::Backend(err.to_string()),
    }
}

/// Share a freshly created file, deleting it again when sharing fails so no unlinked
/// copy stays in the folder.
fn share_or_discard(
    blob: BlobId,
    share: impl FnOnce(&BlobId) -> Result<(), StorageError>,
    discard: impl FnOnce(&BlobId) -> Result<(), StorageError>,
) -> Result<BlobId, StorageError> {
    let Err(err) = share(&blob) else {
        return Ok(blob);
    };
    if let Err(cleanup) = discard(&blob) {
        warn!(blob = %blob, error = %cleanup, "unable to remove unshared drive file");
    }
    Err(err)
}

impl GoogleDriveClient<DriveConnector> {
    /// Authenticate with a service-account key and capture the current runtime handle.
    pub async fn connect(
        credentials: &Path,
        folder_id: Option<String>,
    ) -> Result<Self, StorageError> {
        let key = yup_oauth2::read_service_account_key(credentials)
            .await
            .map_err(|err| {
                StorageError::Unavailable(format!(
                    "unable to read drive credentials {}: {err}",
                    credentials.display()
                ))
            })?;

        let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|err| StorageError::Unavailable(format!("drive authentication: {err}")))?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|err| StorageError::Unavailable(format!("tls roots: {err}")))?
            .https_or_http()
            .enable_http1()
            .build();
        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(connector);

        Ok(Self::new(
            DriveHub::new(client, auth),
            Handle::current(),
            folder_id,
        ))
    }
}

impl<C> std::fmt::Debug for GoogleDriveClient<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleDriveClient")
            .field("folder_id", &self.folder_id)
            .finish_non_exhaustive()
    }
}

impl<C> StorageGateway for GoogleDriveClient<C>
where
    C: google_drive3::common::Connector + Send + Sync + 'static,
{
    fn put(&self, bytes: &[u8], name: &str, mime_type: &str) -> Result<BlobId, StorageError> {
        let metadata = File {
            name: Some(name.to_string()),
            parents: self.folder_id.as_ref().map(|parent| vec![parent.clone()]),
            ..File::default()
        };
        let media_type = mime_type
            .parse::<mime::Mime>()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM);
        let cursor = Cursor::new(bytes.to_vec());

        let result = self.handle.block_on(async {
            self.hub
                .files()
                .create(metadata)
                .param("fields", "id")
                .supports_all_drives(true)
                .add_scope(Scope::Full)
                .upload(cursor, media_type)
                .await
        });

        let (_, file) = result.map_err(|err| classify(&err, None))?;
        let file_id = file
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StorageError::Backend("drive returned no file id".to_string()))?;

        share_or_discard(
            BlobId(file_id),
            |blob| self.share_with_link(&blob.0),
            |blob| self.discard(blob),
        )
    }

    fn get(&self, blob: &BlobId) -> Result<Vec<u8>, StorageError> {
        let result = self.handle.block_on(async {
            self.hub
                .files()
                .get(&blob.0)
                .param("alt", "media")
                .supports_all_drives(true)
                .add_scope(Scope::Full)
                .doit()
                .await
        });

        let (response, _) = result.map_err(|err| classify(&err, Some(blob)))?;
        let bytes = self
            .handle
            .block_on(google_drive3::common::to_bytes(response.into_body()))
            .ok_or_else(|| StorageError::Backend(format!("download of {blob} returned no body")))?;
        Ok(bytes.to_vec())
    }

    fn preview_link(&self, blob: &BlobId) -> Result<Option<String>, StorageError> {
        let result = self.handle.block_on(async {
            self.hub
                .files()
                .get(&blob.0)
                .param("fields", "webViewLink")
                .supports_all_drives(true)
                .add_scope(Scope::Full)
                .doit()
                .await
        });

        let (_, file) = result.map_err(|err| classify(&err, Some(blob)))?;
        Ok(file.web_view_link)
    }

    fn discard(&self, blob: &BlobId) -> Result<(), StorageError> {
        self.handle
            .block_on(async {
                self.hub
                    .files()
                    .delete(&blob.0)
                    .supports_all_drives(true)
                    .add_scope(Scope::Full)
                    .doit()
                    .await
            })
            .map_err(|err| classify(&err, Some(blob)))?;
        Ok(())
    }
}

//! Content-addressed storage of Parquet data files.
//!
//! A data file is identified by the lowercase hex MD5 digest of its contents and stored under the
//! key `<file_id>.parquet`. Uploading the same contents twice stores them once.

use crate::dataset;
use crate::error::ChannelStatsError;
use crate::models::FileId;
use crate::object_store::{ObjectStore, StoredObject};
use crate::resource_manager::ResourceManager;

use bytes::Bytes;
use std::sync::Arc;

/// Content type of stored data files.
pub const PARQUET_CONTENT_TYPE: &str = "application/x-parquet";

/// Returns the identifier of a data file: the lowercase hex MD5 digest of its contents.
pub fn file_id(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Returns the object key under which a data file is stored.
pub fn object_key(file_id: &str) -> String {
    format!("{file_id}.parquet")
}

/// Store of data files on top of an [ObjectStore].
#[derive(Clone)]
pub struct FileStore {
    store: Arc<dyn ObjectStore>,
}

impl FileStore {
    /// Create a FileStore using an object storage backend.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Store a data file unless identical contents are already stored.
    ///
    /// The contents must be non-empty Parquet with a time index column, so that every stored file
    /// can be listed and summarised.
    ///
    /// # Arguments
    ///
    /// * `data`: Contents of the Parquet file
    /// * `resource_manager`: ResourceManager object
    #[tracing::instrument(level = "DEBUG", skip_all, fields(size = data.len()))]
    pub async fn upload(
        &self,
        data: Bytes,
        resource_manager: &ResourceManager,
    ) -> Result<FileId, ChannelStatsError> {
        if data.is_empty() {
            return Err(ChannelStatsError::EmptyUpload);
        }
        let rows = dataset::check_data_file(data.clone())?;
        tracing::debug!("Upload has {} rows", rows);

        let file_id = file_id(&data);
        let key = object_key(&file_id);
        let _conn_permits = resource_manager.s3_connection().await?;
        if self.store.exists(&key).await? {
            tracing::info!("Data file {} already stored", file_id);
            return Ok(FileId {
                file_id,
                stored: false,
            });
        }
        self.store.put(&key, data, PARQUET_CONTENT_TYPE).await?;
        tracing::info!("Stored data file {}", file_id);
        Ok(FileId {
            file_id,
            stored: true,
        })
    }

    /// Retrieve a stored data file.
    ///
    /// Fails with [ChannelStatsError::FileNotFound] if no file with the identifier is stored.
    ///
    /// # Arguments
    ///
    /// * `file_id`: Identifier of the data file
    /// * `resource_manager`: ResourceManager object
    #[tracing::instrument(level = "DEBUG", skip(self, resource_manager))]
    pub async fn load<'a>(
        &self,
        file_id: &str,
        resource_manager: &'a ResourceManager,
    ) -> Result<StoredObject<'a>, ChannelStatsError> {
        let _conn_permits = resource_manager.s3_connection().await?;
        self.store
            .get(&object_key(file_id), resource_manager)
            .await?
            .ok_or_else(|| ChannelStatsError::FileNotFound {
                file_id: file_id.to_string(),
            })
    }
}

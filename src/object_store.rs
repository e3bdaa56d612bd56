//! Object storage backends for data files.

use crate::error::ChannelStatsError;
use crate::resource_manager::ResourceManager;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::RwLock;
use tokio::sync::SemaphorePermit;

/// An object read from storage, together with the memory reserved for it.
#[derive(Debug)]
pub struct StoredObject<'a> {
    /// Object contents
    pub data: Bytes,
    /// Memory permit held while the object is in use
    pub memory_permit: Option<SemaphorePermit<'a>>,
}

/// Key-value storage of data files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns whether an object exists.
    async fn exists(&self, key: &str) -> Result<bool, ChannelStatsError>;

    /// Read an object, or return `None` if it does not exist.
    ///
    /// Memory for the object contents is reserved from `resource_manager` before they are read.
    async fn get<'a>(
        &self,
        key: &str,
        resource_manager: &'a ResourceManager,
    ) -> Result<Option<StoredObject<'a>>, ChannelStatsError>;

    /// Write an object, replacing any existing object with the same key.
    async fn put(&self, key: &str, data: Bytes, content_type: &str)
        -> Result<(), ChannelStatsError>;
}

/// In-memory, HashMap-based object store for tests.
#[cfg(test)]
pub struct InMemoryObjectStore {
    /// Object contents and content type, keyed by object key.
    objects: RwLock<HashMap<String, (Bytes, String)>>,
}

#[cfg(test)]
impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Returns the content type of an object, if it exists.
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key)
            .map(|(_, content_type)| content_type.clone())
    }
}

#[cfg(test)]
impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn exists(&self, key: &str) -> Result<bool, ChannelStatsError> {
        Ok(self.objects.read().expect("lock poisoned").contains_key(key))
    }

    async fn get<'a>(
        &self,
        key: &str,
        resource_manager: &'a ResourceManager,
    ) -> Result<Option<StoredObject<'a>>, ChannelStatsError> {
        let data = match self.objects.read().expect("lock poisoned").get(key) {
            Some((data, _)) => data.clone(),
            None => return Ok(None),
        };
        let memory_permit = resource_manager.memory(data.len()).await?;
        Ok(Some(StoredObject {
            data,
            memory_permit,
        }))
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), ChannelStatsError> {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }
}

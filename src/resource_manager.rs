//! Resource management

use crate::cli::CommandLineArgs;
use crate::error::ChannelStatsError;

use tokio::sync::{Semaphore, SemaphorePermit};

/// [crate::resource_manager::ResourceManager] bounds the resources used by concurrent requests.
///
/// Each type of resource is managed by an optional Tokio Semaphore. A resource without a limit is
/// never waited for.
#[derive(Debug)]
pub struct ResourceManager {
    /// Optional semaphore for object store connections.
    s3_connections: Option<Semaphore>,

    /// Optional semaphore for memory (bytes) held by downloaded data files.
    memory: Option<Semaphore>,

    /// Optional total memory pool in bytes.
    total_memory: Option<usize>,

    /// Optional semaphore for decoding and statistics tasks.
    tasks: Option<Semaphore>,
}

impl ResourceManager {
    /// Returns a new ResourceManager object.
    pub fn new(
        s3_connection_limit: Option<usize>,
        memory_limit: Option<usize>,
        task_limit: Option<usize>,
    ) -> Self {
        Self {
            s3_connections: s3_connection_limit.map(Semaphore::new),
            memory: memory_limit.map(Semaphore::new),
            total_memory: memory_limit,
            tasks: task_limit.map(Semaphore::new),
        }
    }

    /// Returns a ResourceManager configured from command line arguments.
    ///
    /// Without a thread limit, tasks are limited to one less than the number of CPUs, leaving a
    /// CPU for the async runtime.
    pub fn from_args(args: &CommandLineArgs) -> Self {
        let task_limit = args
            .thread_limit
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(1));
        Self::new(args.s3_connection_limit, args.memory_limit, Some(task_limit))
    }

    /// Acquire an object store connection resource.
    pub async fn s3_connection(&self) -> Result<Option<SemaphorePermit>, ChannelStatsError> {
        optional_acquire(&self.s3_connections, 1).await
    }

    /// Acquire memory resource.
    ///
    /// Fails immediately if more memory is requested than the pool holds.
    pub async fn memory(
        &self,
        bytes: usize,
    ) -> Result<Option<SemaphorePermit>, ChannelStatsError> {
        if let Some(total_memory) = self.total_memory {
            if bytes > total_memory {
                return Err(ChannelStatsError::InsufficientMemory {
                    requested: bytes,
                    total: total_memory,
                });
            };
        };
        optional_acquire(&self.memory, bytes).await
    }

    /// Acquire a task resource.
    pub async fn task(&self) -> Result<Option<SemaphorePermit>, ChannelStatsError> {
        optional_acquire(&self.tasks, 1).await
    }
}

/// Acquire permits on an optional Semaphore, if present.
async fn optional_acquire(
    sem: &Option<Semaphore>,
    n: usize,
) -> Result<Option<SemaphorePermit>, ChannelStatsError> {
    let n = n.try_into()?;
    match sem {
        Some(sem) => Ok(Some(sem.acquire_many(n).await?)),
        None => Ok(None),
    }
}

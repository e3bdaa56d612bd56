use crate::cli::CommandLineArgs;
use crate::file_store::FileStore;
use crate::object_store::ObjectStore;
use crate::resource_manager::ResourceManager;
use crate::s3_client::S3Client;

use std::sync::Arc;

/// Shared application state passed to each request handler.
pub struct AppState {
    /// Command line arguments.
    pub args: CommandLineArgs,

    /// Resource manager.
    pub resource_manager: ResourceManager,

    /// Data file store.
    pub file_store: FileStore,
}

impl AppState {
    /// Create and return an [AppState] backed by the configured S3 bucket.
    pub fn new(args: &CommandLineArgs) -> Self {
        Self::with_store(args, Arc::new(S3Client::from_args(args)))
    }

    /// Create and return an [AppState] backed by an arbitrary object store.
    pub fn with_store(args: &CommandLineArgs, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            args: args.clone(),
            resource_manager: ResourceManager::from_args(args),
            file_store: FileStore::new(store),
        }
    }
}

/// AppState wrapped in an Atomic Reference Count (Arc) to allow multiple references.
pub type SharedAppState = Arc<AppState>;

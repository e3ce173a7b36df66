pub mod local;
pub mod qdrant;

pub use local::LocalVectorStore;
pub use qdrant::QdrantStore;

use crate::config::VectorStoreConfig;
use crate::error::StoreError;
use crate::store::RecordStore;

/// Qdrant when a server URL is configured, otherwise the on-disk store.
pub async fn open_store(
    config: &VectorStoreConfig,
    vector_size: usize,
) -> Result<Box<dyn RecordStore>, StoreError> {
    match &config.url {
        Some(url) => Ok(Box::new(
            QdrantStore::open(url, config.collection.clone(), vector_size).await?,
        )),
        None => Ok(Box::new(LocalVectorStore::open(&config.path)?)),
    }
}

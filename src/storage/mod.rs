//! Content-addressed blob storage for FHIR resources and identity documents.

use async_trait::async_trait;

use crate::error::DidHealthResult;

pub mod ipfs;
pub mod memory;
pub mod uri;

pub use self::{ipfs::IpfsHttpStore, memory::MemoryStore, uri::ContentUri};

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a blob under `name_hint` (e.g. `Patient/<id>.json`) and return its address.
    /// Identical bytes yield the same content id.
    async fn store(&self, blob: Vec<u8>, name_hint: &str) -> DidHealthResult<ContentUri>;

    async fn fetch(&self, uri: &ContentUri) -> DidHealthResult<Vec<u8>>;

    /// Fetch by either a native `ipfs://` URI or a gateway URL.
    async fn fetch_str(&self, uri: &str) -> DidHealthResult<Vec<u8>> {
        let uri = ContentUri::parse(uri)?;
        self.fetch(&uri).await
    }
}

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::{ContentStore, ContentUri};
use crate::error::{DidHealthResult, StorageErrorSource};

/// multicodec of raw leaves
const RAW_CODEC: u8 = 0x55;
/// multicodec of UnixFS directories
const DAG_PB_CODEC: u8 = 0x70;

#[derive(Debug, Default)]
struct Blocks {
    /// raw leaf CID -> bytes
    files: HashMap<String, Vec<u8>>,
    /// directory CID -> path -> raw leaf CID
    directories: HashMap<String, BTreeMap<String, String>>,
}

/// In-process content-addressed store laid out like an IPFS `add` with
/// `wrap-with-directory`: every upload returns a directory CID holding the
/// blob under its name hint. `<dir>/<path>` reads the file, a bare CID reads
/// a raw leaf.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<Blocks>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of `store` calls served
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// number of distinct blobs held
    pub async fn len(&self) -> usize {
        self.blocks.read().await.files.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.files.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn store(&self, blob: Vec<u8>, name_hint: &str) -> DidHealthResult<ContentUri> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let path = name_hint.trim_start_matches('/').to_string();
        let file_cid = cid_v1_raw(&blob);
        let dir_cid = directory_cid(&path, &file_cid);

        let mut blocks = self.blocks.write().await;
        blocks.files.insert(file_cid.clone(), blob);
        blocks
            .directories
            .entry(dir_cid.clone())
            .or_default()
            .insert(path.clone(), file_cid);
        Ok(ContentUri::new(dir_cid, Some(path)))
    }

    async fn fetch(&self, uri: &ContentUri) -> DidHealthResult<Vec<u8>> {
        let blocks = self.blocks.read().await;
        let file_cid = match &uri.path {
            Some(path) => blocks
                .directories
                .get(&uri.cid)
                .and_then(|entries| entries.get(path.trim_matches('/'))),
            None => Some(&uri.cid),
        };
        file_cid
            .and_then(|cid| blocks.files.get(cid))
            .cloned()
            .ok_or_else(|| StorageErrorSource::NotFound(uri.to_native()).into())
    }
}

fn cid_v1(codec: u8, content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let mut bytes = Vec::with_capacity(4 + digest.len());
    bytes.extend_from_slice(&[0x01, codec, 0x12, 0x20]);
    bytes.extend_from_slice(&digest);
    format!(
        "b{}",
        base32::encode(base32::Alphabet::Rfc4648Lower { padding: false }, &bytes)
    )
}

/// CIDv1, raw codec, sha2-256 multihash, base32-lower multibase (`b` prefix).
pub fn cid_v1_raw(blob: &[u8]) -> String {
    cid_v1(RAW_CODEC, blob)
}

/// CIDv1 of a single-entry directory, derived from the entry's path and leaf CID.
fn directory_cid(path: &str, file_cid: &str) -> String {
    let mut node = path.as_bytes().to_vec();
    node.push(0);
    node.extend_from_slice(file_cid.as_bytes());
    cid_v1(DAG_PB_CODEC, &node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_bytes_share_a_leaf_but_not_a_directory() {
        let store = MemoryStore::new();
        let a = store.store(b"hello".to_vec(), "Patient/a.json").await.unwrap();
        let b = store.store(b"hello".to_vec(), "Patient/b.json").await.unwrap();
        let again = store.store(b"hello".to_vec(), "/Patient/a.json").await.unwrap();
        assert_ne!(a.cid, b.cid);
        assert_eq!(a, again);
        assert_eq!(a.path.as_deref(), Some("Patient/a.json"));
        assert_eq!(store.len().await, 1);
        assert_eq!(store.write_count(), 3);

        let leaf = ContentUri::new(cid_v1_raw(b"hello"), None);
        assert_eq!(store.fetch(&leaf).await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn fetch_needs_the_stored_path() {
        let store = MemoryStore::new();
        let uri = store.store(b"{}".to_vec(), "didDocument/x.json").await.unwrap();
        assert_eq!(store.fetch(&uri).await.unwrap(), b"{}".to_vec());
        assert_eq!(store.fetch_str(&uri.to_gateway("https://w3s.link")).await.unwrap(), b"{}".to_vec());

        let wrong_file = ContentUri::new(uri.cid.clone(), Some("didDocument/y.json".into()));
        assert!(store.fetch(&wrong_file).await.unwrap_err().to_string().contains("not found"));
        let bare_directory = ContentUri::new(uri.cid.clone(), None);
        assert!(store.fetch(&bare_directory).await.is_err());

        let missing = ContentUri::new("bafkmissing", None);
        let e = store.fetch(&missing).await.unwrap_err();
        assert!(e.to_string().contains("not found"));
    }

    #[test]
    fn cid_shape() {
        // raw leaf CIDv1 of sha2-256 always starts with `bafkrei`
        let cid = cid_v1_raw(b"abc");
        assert!(cid.starts_with("bafkrei"));
        assert_eq!(cid.len(), 59);
        assert!(directory_cid("a.json", &cid).starts_with("bafybei"));
    }
}

//! Storage collaborators
//!
//! The uploader only talks to storage through these two traits. A real
//! deployment plugs in a cluster client; the bundled backends cover tests and
//! single-host setups:
//! - `MemoryStorage` keeps files in process
//! - `FileSystemStorage` maps each node to a directory

pub mod filesystem;
pub mod memory;

pub use filesystem::FileSystemStorage;
pub use memory::MemoryStorage;

use crate::error::StorageError;
use crate::models::{normalize_extension, MetaData, StorageNode, StorePath};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Picks the node an upload group writes to
#[async_trait]
pub trait StorageCluster: Send + Sync {
    async fn select_writable_node(&self) -> Result<StorageNode, StorageError>;
}

/// File operations against a selected node
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Store a master file with its metadata, returning its location
    async fn store_master(
        &self,
        node: &StorageNode,
        content: Bytes,
        file_size: u64,
        ext: &str,
        metadata: &BTreeSet<MetaData>,
    ) -> Result<StorePath, StorageError>;

    /// Store a slave file linked to `master_path` under `prefix`
    async fn store_slave(
        &self,
        node: &StorageNode,
        content: Bytes,
        file_size: u64,
        master_path: &str,
        prefix: &str,
        ext: &str,
    ) -> Result<(), StorageError>;

    /// Remove a file from the node
    async fn delete_file(&self, node: &StorageNode, path: &str) -> Result<(), StorageError>;
}

/// Round-robin over a fixed node list
#[derive(Debug)]
pub(crate) struct NodeRing {
    nodes: Vec<StorageNode>,
    next: AtomicUsize,
}

impl NodeRing {
    pub(crate) fn new(nodes: Vec<StorageNode>) -> Self {
        Self {
            nodes,
            next: AtomicUsize::new(0),
        }
    }

    pub(crate) fn select(&self) -> Result<StorageNode, StorageError> {
        if self.nodes.is_empty() {
            return Err(StorageError::NoWritableNode);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.nodes.len();
        Ok(self.nodes[index].clone())
    }

    pub(crate) fn nodes(&self) -> &[StorageNode] {
        &self.nodes
    }
}

/// `Mxx/HH/HH/<uuid>.<ext>`, two hashed directory levels under the store path
pub(crate) fn generate_file_path(node: &StorageNode, ext: &str) -> String {
    let id = Uuid::new_v4();
    let bytes = id.as_bytes();
    let ext = normalize_extension(ext);
    let name = if ext.is_empty() {
        id.simple().to_string()
    } else {
        format!("{}.{}", id.simple(), ext)
    };
    format!(
        "M{:02X}/{:02X}/{:02X}/{}",
        node.store_path_index, bytes[0], bytes[1], name
    )
}

/// Reject paths that could escape a node's root
pub(crate) fn check_relative_path(path: &str) -> Result<(), StorageError> {
    let escapes = path.starts_with('/')
        || path.split('/').any(|segment| segment == ".." || segment.is_empty());
    if escapes {
        return Err(StorageError::NotFound(path.to_string()));
    }
    Ok(())
}

//! In-process storage cluster
//!
//! Files live in a map per node, so a slave written to a node that does not hold
//! its master is rejected the same way a real storage node would reject it.

use super::{check_relative_path, generate_file_path, NodeRing, StorageClient, StorageCluster};
use crate::error::StorageError;
use crate::models::{MetaData, StorageNode, StorePath};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredFile {
    content: Bytes,
    metadata: BTreeSet<MetaData>,
    master: Option<String>,
}

/// In-memory storage cluster implementing both collaborator traits
#[derive(Debug)]
pub struct MemoryStorage {
    ring: NodeRing,
    files: RwLock<HashMap<StorageNode, HashMap<String, StoredFile>>>,
}

impl MemoryStorage {
    pub fn new(nodes: Vec<StorageNode>) -> Self {
        Self {
            ring: NodeRing::new(nodes),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// `node_count` nodes in one group, addressed `127.0.0.1:23000`, `:23001`, ...
    pub fn with_group(group_name: &str, node_count: usize) -> Self {
        let nodes = (0..node_count)
            .map(|i| StorageNode::new(group_name, format!("127.0.0.1:{}", 23000 + i), 0))
            .collect();
        Self::new(nodes)
    }

    pub fn nodes(&self) -> &[StorageNode] {
        self.ring.nodes()
    }

    /// Content of a file, looked up on every node of the path's group
    pub fn get(&self, path: &StorePath) -> Option<Bytes> {
        self.find(path, |file| file.content.clone())
    }

    /// Metadata stored with a master file
    pub fn metadata(&self, path: &StorePath) -> Option<BTreeSet<MetaData>> {
        self.find(path, |file| file.metadata.clone())
    }

    /// Master path a slave file was linked to
    pub fn master_of(&self, path: &StorePath) -> Option<String> {
        self.find(path, |file| file.master.clone()).flatten()
    }

    /// Node holding the file
    pub fn node_of(&self, path: &StorePath) -> Option<StorageNode> {
        let files = self.files.read();
        files
            .iter()
            .filter(|(node, _)| node.group_name == path.group)
            .find(|(_, node_files)| node_files.contains_key(&path.path))
            .map(|(node, _)| node.clone())
    }

    pub fn contains(&self, path: &StorePath) -> bool {
        self.node_of(path).is_some()
    }

    /// Total number of files across all nodes
    pub fn file_count(&self) -> usize {
        self.files.read().values().map(HashMap::len).sum()
    }

    fn find<T>(&self, path: &StorePath, read: impl Fn(&StoredFile) -> T) -> Option<T> {
        let files = self.files.read();
        files
            .iter()
            .filter(|(node, _)| node.group_name == path.group)
            .find_map(|(_, node_files)| node_files.get(&path.path).map(&read))
    }

    fn check_node(&self, node: &StorageNode) -> Result<(), StorageError> {
        if self.ring.nodes().contains(node) {
            Ok(())
        } else {
            Err(StorageError::Unavailable {
                node: node.to_string(),
                message: "node is not part of this cluster".to_string(),
            })
        }
    }
}

#[async_trait]
impl StorageCluster for MemoryStorage {
    async fn select_writable_node(&self) -> Result<StorageNode, StorageError> {
        self.ring.select()
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn store_master(
        &self,
        node: &StorageNode,
        content: Bytes,
        file_size: u64,
        ext: &str,
        metadata: &BTreeSet<MetaData>,
    ) -> Result<StorePath, StorageError> {
        self.check_node(node)?;
        let path = generate_file_path(node, ext);

        self.files.write().entry(node.clone()).or_default().insert(
            path.clone(),
            StoredFile {
                content,
                metadata: metadata.clone(),
                master: None,
            },
        );

        debug!(node = %node, path = %path, file_size, "Master stored in memory");
        Ok(StorePath::new(node.group_name.clone(), path))
    }

    async fn store_slave(
        &self,
        node: &StorageNode,
        content: Bytes,
        file_size: u64,
        master_path: &str,
        prefix: &str,
        ext: &str,
    ) -> Result<(), StorageError> {
        self.check_node(node)?;
        let mut files = self.files.write();
        let node_files = files.entry(node.clone()).or_default();

        if !node_files.contains_key(master_path) {
            return Err(StorageError::MasterNotFound(master_path.to_string()));
        }

        let slave_path =
            StorePath::new(node.group_name.clone(), master_path).slave_path(prefix, ext);
        if node_files.contains_key(&slave_path) {
            return Err(StorageError::AlreadyExists(slave_path));
        }

        debug!(node = %node, path = %slave_path, file_size, "Slave stored in memory");
        node_files.insert(
            slave_path,
            StoredFile {
                content,
                metadata: BTreeSet::new(),
                master: Some(master_path.to_string()),
            },
        );
        Ok(())
    }

    async fn delete_file(&self, node: &StorageNode, path: &str) -> Result<(), StorageError> {
        check_relative_path(path)?;
        self.files
            .write()
            .get_mut(node)
            .and_then(|node_files| node_files.remove(path))
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

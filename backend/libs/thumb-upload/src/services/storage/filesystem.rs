//! Filesystem-backed storage cluster
//!
//! Each node is a directory under the root:
//!
//! ```text
//! {root}/{group}/{host_port}/M00/3F/A2/<uuid>.jpg        master
//! {root}/{group}/{host_port}/M00/3F/A2/<uuid>.jpg-m      master metadata (JSON)
//! {root}/{group}/{host_port}/M00/3F/A2/<uuid>_150x150.jpg slave
//! ```
//!
//! Writes go to a temp file first and are renamed into place.

use super::{check_relative_path, generate_file_path, NodeRing, StorageClient, StorageCluster};
use crate::error::StorageError;
use crate::models::{MetaData, StorageNode, StorePath};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const METADATA_SUFFIX: &str = "-m";

/// Storage cluster whose nodes are local directories
#[derive(Debug)]
pub struct FileSystemStorage {
    root: PathBuf,
    ring: NodeRing,
}

impl FileSystemStorage {
    /// Create the root and one directory per node
    #[tracing::instrument(skip(root, nodes), fields(nodes = nodes.len()))]
    pub fn new(root: impl Into<PathBuf>, nodes: Vec<StorageNode>) -> Result<Self, StorageError> {
        let root = root.into();
        let storage = Self {
            root,
            ring: NodeRing::new(nodes),
        };
        for node in storage.ring.nodes() {
            std::fs::create_dir_all(storage.node_dir(node))?;
        }

        tracing::info!(path = %storage.root.display(), "Created filesystem storage");
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a file stored on `node`
    pub async fn read(&self, node: &StorageNode, path: &str) -> Result<Bytes, StorageError> {
        let full = self.file_path(node, path)?;
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Metadata stored alongside a master file (empty when none was attached)
    pub async fn read_metadata(
        &self,
        node: &StorageNode,
        path: &str,
    ) -> Result<BTreeSet<MetaData>, StorageError> {
        let full = self.file_path(node, path)?;
        if !tokio::fs::try_exists(&full).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }
        match tokio::fs::read(metadata_path(&full)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn node_dir(&self, node: &StorageNode) -> PathBuf {
        let address: String = node
            .address
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.root.join(&node.group_name).join(address)
    }

    fn file_path(&self, node: &StorageNode, path: &str) -> Result<PathBuf, StorageError> {
        check_relative_path(path)?;
        Ok(self.node_dir(node).join(path))
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
impl StorageCluster for FileSystemStorage {
    async fn select_writable_node(&self) -> Result<StorageNode, StorageError> {
        self.ring.select()
    }
}

#[async_trait]
impl StorageClient for FileSystemStorage {
    #[tracing::instrument(skip(self, content, metadata), fields(node = %node))]
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
        let full = self.file_path(node, &path)?;

        write_atomic(&full, &content).await?;
        if !metadata.is_empty() {
            let encoded = serde_json::to_vec(metadata)?;
            write_atomic(&metadata_path(&full), &encoded).await?;
        }

        tracing::debug!(path = %path, file_size, "Master written");
        Ok(StorePath::new(node.group_name.clone(), path))
    }

    #[tracing::instrument(skip(self, content), fields(node = %node))]
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
        let master_full = self.file_path(node, master_path)?;
        if !tokio::fs::try_exists(&master_full).await? {
            return Err(StorageError::MasterNotFound(master_path.to_string()));
        }

        let slave_path =
            StorePath::new(node.group_name.clone(), master_path).slave_path(prefix, ext);
        let slave_full = self.file_path(node, &slave_path)?;
        if tokio::fs::try_exists(&slave_full).await? {
            return Err(StorageError::AlreadyExists(slave_path));
        }

        write_atomic(&slave_full, &content).await?;
        tracing::debug!(path = %slave_path, file_size, "Slave written");
        Ok(())
    }

    async fn delete_file(&self, node: &StorageNode, path: &str) -> Result<(), StorageError> {
        let full = self.file_path(node, path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        match tokio::fs::remove_file(metadata_path(&full)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn metadata_path(full: &Path) -> PathBuf {
    let mut raw = full.as_os_str().to_owned();
    raw.push(METADATA_SUFFIX);
    PathBuf::from(raw)
}

async fn write_atomic(target: &Path, data: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = target.as_os_str().to_owned();
    tmp.push(format!(".tmp-{}", Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);

    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&tmp, target).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<StorageNode> {
        vec![
            StorageNode::new("group1", "10.0.0.1:23000", 0),
            StorageNode::new("group1", "10.0.0.2:23000", 0),
        ]
    }

    #[test]
    fn test_new_creates_node_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemStorage::new(dir.path(), nodes()).unwrap();

        assert!(storage.root().join("group1").join("10.0.0.1_23000").is_dir());
        assert!(storage.root().join("group1").join("10.0.0.2_23000").is_dir());
    }

    #[tokio::test]
    async fn test_master_slave_and_metadata_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemStorage::new(dir.path(), nodes()).unwrap();
        let node = storage.select_writable_node().await.unwrap();
        let metadata = BTreeSet::from([
            MetaData::new("width", "640"),
            MetaData::new("author", "nova"),
        ]);

        let master = storage
            .store_master(&node, Bytes::from_static(b"master-bytes"), 12, "png", &metadata)
            .await
            .unwrap();
        storage
            .store_slave(&node, Bytes::from_static(b"thumb"), 5, &master.path, "_64x64", "png")
            .await
            .unwrap();

        let slave_path = master.slave_path("_64x64", "png");
        assert_eq!(
            storage.read(&node, &master.path).await.unwrap(),
            Bytes::from_static(b"master-bytes")
        );
        assert_eq!(
            storage.read(&node, &slave_path).await.unwrap(),
            Bytes::from_static(b"thumb")
        );
        assert_eq!(storage.read_metadata(&node, &master.path).await.unwrap(), metadata);
        assert!(storage.read_metadata(&node, &slave_path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slave_without_master_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemStorage::new(dir.path(), nodes()).unwrap();
        let first = storage.select_writable_node().await.unwrap();
        let second = storage.select_writable_node().await.unwrap();

        let master = storage
            .store_master(&first, Bytes::from_static(b"m"), 1, "jpg", &BTreeSet::new())
            .await
            .unwrap();

        let err = storage
            .store_slave(&second, Bytes::from_static(b"s"), 1, &master.path, "_t", "jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MasterNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemStorage::new(dir.path(), nodes()).unwrap();
        let node = storage.select_writable_node().await.unwrap();
        let metadata = BTreeSet::from([MetaData::new("k", "v")]);

        let master = storage
            .store_master(&node, Bytes::from_static(b"m"), 1, "jpg", &metadata)
            .await
            .unwrap();
        storage.delete_file(&node, &master.path).await.unwrap();

        assert!(matches!(
            storage.read(&node, &master.path).await,
            Err(StorageError::NotFound(_))
        ));
        let full = storage.file_path(&node, &master.path).unwrap();
        assert!(!metadata_path(&full).exists());
        assert!(matches!(
            storage.delete_file(&node, &master.path).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSystemStorage::new(dir.path(), nodes()).unwrap();
        let node = storage.select_writable_node().await.unwrap();

        assert!(storage.read(&node, "../../etc/passwd").await.is_err());
        assert!(storage.delete_file(&node, "/etc/passwd").await.is_err());
    }
}

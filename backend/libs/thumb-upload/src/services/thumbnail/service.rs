//! Thumbnail uploader - master + thumbnail group uploads
//!
//! One call is one group:
//! 1. Resolve the spec list (caller's, or a registry snapshot)
//! 2. Validate the extension
//! 3. Read the caller's stream once into memory
//! 4. Select one storage node
//! 5. Store the master
//! 6. For each spec in order: transform a fresh view of the source and store it
//!    as a slave of the master under the spec's prefix
//!
//! Any failure stops the group. Slaves are uploaded one at a time because they
//! share the node and the source buffer.

use super::processor::{ImageTransformer, ThumbnailProcessor};
use super::registry::ThumbSpecRegistry;
use super::spec::{ThumbScaleSpec, ThumbSizeSpec, ThumbSpec};
use crate::config::{ThumbnailSettings, DEFAULT_MAX_SOURCE_BYTES};
use crate::error::{AppError, Result, ThumbnailFailure};
use crate::models::{normalize_extension, ImageType, MetaData, StorageNode, StorePath};
use crate::services::storage::{StorageClient, StorageCluster};
use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, warn};

/// Uploader behaviour
#[derive(Clone, Debug)]
pub struct ThumbnailUploaderConfig {
    /// Delete already-written files of a group when a thumbnail fails
    pub cleanup_on_failure: bool,
    /// Largest source buffered in memory, 0 = unlimited
    pub max_source_bytes: usize,
}

impl Default for ThumbnailUploaderConfig {
    fn default() -> Self {
        Self {
            cleanup_on_failure: false,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

impl From<&ThumbnailSettings> for ThumbnailUploaderConfig {
    fn from(settings: &ThumbnailSettings) -> Self {
        Self {
            cleanup_on_failure: settings.cleanup_on_failure,
            max_source_bytes: settings.max_source_bytes,
        }
    }
}

/// Files written so far by one group
#[derive(Debug)]
struct UploadGroup {
    node: StorageNode,
    master: StorePath,
    slaves: Vec<SlaveRecord>,
}

#[derive(Debug)]
struct SlaveRecord {
    prefix: String,
    path: String,
    size: u64,
}

/// Uploads a source image and its thumbnails as one group on one node
pub struct ThumbnailUploader {
    cluster: Arc<dyn StorageCluster>,
    client: Arc<dyn StorageClient>,
    transformer: Arc<dyn ImageTransformer>,
    registry: Arc<ThumbSpecRegistry>,
    config: ThumbnailUploaderConfig,
}

impl ThumbnailUploader {
    pub fn new(
        cluster: Arc<dyn StorageCluster>,
        client: Arc<dyn StorageClient>,
        transformer: Arc<dyn ImageTransformer>,
        registry: Arc<ThumbSpecRegistry>,
        config: ThumbnailUploaderConfig,
    ) -> Self {
        Self {
            cluster,
            client,
            transformer,
            registry,
            config,
        }
    }

    /// Uploader using the `image`-backed processor
    pub fn with_processor(
        cluster: Arc<dyn StorageCluster>,
        client: Arc<dyn StorageClient>,
        registry: Arc<ThumbSpecRegistry>,
        config: ThumbnailUploaderConfig,
    ) -> Self {
        Self::new(
            cluster,
            client,
            Arc::new(ThumbnailProcessor::with_defaults()),
            registry,
            config,
        )
    }

    pub fn registry(&self) -> &Arc<ThumbSpecRegistry> {
        &self.registry
    }

    /// Upload a master plus one scaled thumbnail per spec
    ///
    /// `None` uses the registry's default scale specs.
    #[tracing::instrument(skip_all, fields(ext = %ext, file_size = file_size))]
    pub async fn upload_with_scales<R>(
        &self,
        source: R,
        file_size: u64,
        ext: &str,
        metadata: &BTreeSet<MetaData>,
        scale_specs: Option<&[ThumbScaleSpec]>,
    ) -> Result<StorePath>
    where
        R: AsyncRead + Unpin + Send,
    {
        let specs: Vec<ThumbSpec> = match scale_specs {
            Some(specs) => specs.iter().cloned().map(ThumbSpec::from).collect(),
            None => self
                .registry
                .snapshot()
                .scale_specs()
                .iter()
                .cloned()
                .map(ThumbSpec::from)
                .collect(),
        };

        let group = self.upload_group(source, file_size, ext, metadata, specs).await?;
        Ok(group.master)
    }

    /// Upload a master plus one resized thumbnail per spec
    ///
    /// `None` uses the registry's default size specs.
    #[tracing::instrument(skip_all, fields(ext = %ext, file_size = file_size))]
    pub async fn upload_with_sizes<R>(
        &self,
        source: R,
        file_size: u64,
        ext: &str,
        metadata: &BTreeSet<MetaData>,
        size_specs: Option<&[ThumbSizeSpec]>,
    ) -> Result<StorePath>
    where
        R: AsyncRead + Unpin + Send,
    {
        let specs: Vec<ThumbSpec> = match size_specs {
            Some(specs) => specs.iter().cloned().map(ThumbSpec::from).collect(),
            None => self
                .registry
                .snapshot()
                .size_specs()
                .iter()
                .cloned()
                .map(ThumbSpec::from)
                .collect(),
        };

        let group = self.upload_group(source, file_size, ext, metadata, specs).await?;
        Ok(group.master)
    }

    /// Upload a master plus every default scale and size thumbnail
    ///
    /// Scale thumbnails come first, then size thumbnails, both from a single
    /// registry snapshot.
    #[tracing::instrument(skip_all, fields(ext = %ext, file_size = file_size))]
    pub async fn upload_auto<R>(
        &self,
        source: R,
        file_size: u64,
        ext: &str,
        metadata: &BTreeSet<MetaData>,
    ) -> Result<StorePath>
    where
        R: AsyncRead + Unpin + Send,
    {
        let snapshot = self.registry.snapshot();
        let specs: Vec<ThumbSpec> = snapshot
            .scale_specs()
            .iter()
            .cloned()
            .map(ThumbSpec::from)
            .chain(snapshot.size_specs().iter().cloned().map(ThumbSpec::from))
            .collect();

        let group = self.upload_group(source, file_size, ext, metadata, specs).await?;
        Ok(group.master)
    }

    async fn upload_group<R>(
        &self,
        mut source: R,
        file_size: u64,
        ext: &str,
        metadata: &BTreeSet<MetaData>,
        specs: Vec<ThumbSpec>,
    ) -> Result<UploadGroup>
    where
        R: AsyncRead + Unpin + Send,
    {
        let image_type = validate_image_type(ext)?;
        let ext = normalize_extension(ext);

        let content = self.read_source(&mut source).await?;
        let actual_size = content.len() as u64;
        if actual_size != file_size {
            warn!(
                declared = file_size,
                actual = actual_size,
                "Declared file size does not match source length"
            );
        }

        let node = self.cluster.select_writable_node().await?;
        debug!(node = %node, thumbnails = specs.len(), "Storage node selected");

        let master = self
            .client
            .store_master(&node, content.clone(), actual_size, &ext, metadata)
            .await?;
        info!(node = %node, master = %master, size = actual_size, "Master image uploaded");

        let mut group = UploadGroup {
            node,
            master,
            slaves: Vec::with_capacity(specs.len()),
        };

        for spec in &specs {
            match self
                .upload_thumbnail(&group, content.clone(), image_type, &ext, spec)
                .await
            {
                Ok(record) => group.slaves.push(record),
                Err(failure) => {
                    error!(
                        master = %group.master,
                        spec = %spec,
                        uploaded = group.slaves.len(),
                        error = %failure,
                        "Thumbnail upload failed"
                    );
                    if self.config.cleanup_on_failure {
                        self.remove_group(&group).await;
                    }
                    return Err(AppError::ThumbnailUpload {
                        master: group.master,
                        prefix: spec.prefix().to_string(),
                        source: failure,
                    });
                }
            }
        }

        info!(
            master = %group.master,
            node = %group.node,
            thumbnails = group.slaves.len(),
            thumbnail_bytes = group.slaves.iter().map(|s| s.size).sum::<u64>(),
            "Image group uploaded"
        );
        Ok(group)
    }

    /// Transform one fresh view of the source and store it as a slave
    async fn upload_thumbnail(
        &self,
        group: &UploadGroup,
        source: Bytes,
        image_type: ImageType,
        ext: &str,
        spec: &ThumbSpec,
    ) -> std::result::Result<SlaveRecord, ThumbnailFailure> {
        let transformer = Arc::clone(&self.transformer);
        let task_spec = spec.clone();
        let thumbnail = tokio::task::spawn_blocking(move || {
            transformer.transform(&source, image_type, &task_spec)
        })
        .await
        .map_err(|e| ThumbnailFailure::Task(e.to_string()))??;

        let size = thumbnail.len() as u64;
        self.client
            .store_slave(
                &group.node,
                thumbnail,
                size,
                &group.master.path,
                spec.prefix(),
                ext,
            )
            .await?;

        let path = group.master.slave_path(spec.prefix(), ext);
        debug!(path = %path, size, "Thumbnail uploaded");
        Ok(SlaveRecord {
            prefix: spec.prefix().to_string(),
            path,
            size,
        })
    }

    /// Read the whole stream, enforcing `max_source_bytes`
    async fn read_source<R>(&self, source: &mut R) -> Result<Bytes>
    where
        R: AsyncRead + Unpin + Send,
    {
        let limit = self.config.max_source_bytes;
        let mut buf = Vec::new();

        if limit == 0 {
            source.read_to_end(&mut buf).await?;
        } else {
            // One byte past the limit tells an exact fit from an overflow
            source.take(limit as u64 + 1).read_to_end(&mut buf).await?;
            if buf.len() > limit {
                return Err(AppError::InvalidInput(format!(
                    "source image exceeds {limit} bytes"
                )));
            }
        }

        Ok(Bytes::from(buf))
    }

    /// Best-effort delete of everything the group wrote, newest first
    async fn remove_group(&self, group: &UploadGroup) {
        for slave in group.slaves.iter().rev() {
            if let Err(e) = self.client.delete_file(&group.node, &slave.path).await {
                warn!(path = %slave.path, prefix = %slave.prefix, error = %e, "Failed to delete thumbnail");
            }
        }
        match self.client.delete_file(&group.node, &group.master.path).await {
            Ok(()) => info!(master = %group.master, "Removed master after thumbnail failure"),
            Err(e) => warn!(master = %group.master, error = %e, "Failed to delete master"),
        }
    }
}

/// Non-blank and on the allow-list
fn validate_image_type(ext: &str) -> Result<ImageType> {
    let normalized = normalize_extension(ext);
    if normalized.is_empty() {
        return Err(AppError::InvalidInput(
            "file extension must not be blank".to_string(),
        ));
    }
    ImageType::from_extension(&normalized).ok_or(AppError::UnsupportedImageType(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::MemoryStorage;
    use crate::services::thumbnail::ThumbSpecSet;
    use image::{DynamicImage, GenericImageView, ImageOutputFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn uploader(storage: Arc<MemoryStorage>, config: ThumbnailUploaderConfig) -> ThumbnailUploader {
        let set = ThumbSpecSet::new(
            vec![ThumbScaleSpec::new(0.5, 0.8).unwrap()],
            vec![ThumbSizeSpec::new(16, 16).unwrap()],
        )
        .unwrap();
        ThumbnailUploader::with_processor(
            storage.clone(),
            storage,
            Arc::new(ThumbSpecRegistry::new(set)),
            config,
        )
    }

    #[test]
    fn test_validate_image_type() {
        assert_eq!(validate_image_type("JPG").unwrap(), ImageType::Jpeg);
        assert_eq!(validate_image_type(".png").unwrap(), ImageType::Png);
        assert!(matches!(validate_image_type("  "), Err(AppError::InvalidInput(_))));
        assert!(matches!(
            validate_image_type("txt"),
            Err(AppError::UnsupportedImageType(ext)) if ext == "txt"
        ));
    }

    #[tokio::test]
    async fn test_upload_auto_into_memory_storage() {
        let storage = Arc::new(MemoryStorage::with_group("group1", 1));
        let uploader = uploader(storage.clone(), ThumbnailUploaderConfig::default());
        let source = png(40, 20);

        let master = uploader
            .upload_auto(source.as_slice(), source.len() as u64, "PNG", &BTreeSet::new())
            .await
            .unwrap();

        assert!(master.path.ends_with(".png"));
        assert_eq!(storage.file_count(), 3);

        let scaled = storage.get(&master.slave("_s50q80", "png")).unwrap();
        let img = image::load_from_memory(&scaled).unwrap();
        assert_eq!(img.dimensions(), (20, 10));

        let sized = storage.get(&master.slave("_16x16", "png")).unwrap();
        let img = image::load_from_memory(&sized).unwrap();
        assert_eq!(img.dimensions(), (16, 16));
    }

    #[tokio::test]
    async fn test_source_over_limit_rejected_before_upload() {
        let storage = Arc::new(MemoryStorage::with_group("group1", 1));
        let config = ThumbnailUploaderConfig {
            max_source_bytes: 8,
            ..Default::default()
        };
        let uploader = uploader(storage.clone(), config);
        let source = png(10, 10);

        let err = uploader
            .upload_with_sizes(source.as_slice(), source.len() as u64, "png", &BTreeSet::new(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(storage.file_count(), 0);
    }

    #[tokio::test]
    async fn test_source_exactly_at_limit_accepted() {
        let storage = Arc::new(MemoryStorage::with_group("group1", 1));
        let source = png(10, 10);
        let config = ThumbnailUploaderConfig {
            max_source_bytes: source.len(),
            ..Default::default()
        };
        let uploader = uploader(storage.clone(), config);

        uploader
            .upload_with_sizes(source.as_slice(), source.len() as u64, "png", &BTreeSet::new(), Some(&[][..]))
            .await
            .unwrap();
        assert_eq!(storage.file_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_master_when_enabled() {
        let storage = Arc::new(MemoryStorage::with_group("group1", 1));
        let config = ThumbnailUploaderConfig {
            cleanup_on_failure: true,
            ..Default::default()
        };
        let uploader = uploader(storage.clone(), config);

        // Valid extension, undecodable payload: master stores, first thumbnail fails
        let err = uploader
            .upload_auto(&b"not a png"[..], 9, "png", &BTreeSet::new())
            .await
            .unwrap_err();

        let master = err.orphaned_master().cloned().unwrap();
        assert!(!storage.contains(&master));
        assert_eq!(storage.file_count(), 0);
    }

    #[tokio::test]
    async fn test_master_left_in_place_by_default() {
        let storage = Arc::new(MemoryStorage::with_group("group1", 1));
        let uploader = uploader(storage.clone(), ThumbnailUploaderConfig::default());

        let err = uploader
            .upload_auto(&b"not a png"[..], 9, "png", &BTreeSet::new())
            .await
            .unwrap_err();

        match &err {
            AppError::ThumbnailUpload { prefix, source, .. } => {
                assert_eq!(prefix, "_s50q80");
                assert!(matches!(source, ThumbnailFailure::Transform(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(storage.contains(err.orphaned_master().unwrap()));
        assert_eq!(storage.file_count(), 1);
    }
}

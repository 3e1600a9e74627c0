//! Thumb Upload
//!
//! Uploads an image and a set of thumbnails derived from it as one group on a
//! single storage node. The original is stored as the master file; each
//! thumbnail is stored as a slave file named after the master plus a prefix.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

// Public re-exports
pub use config::ThumbnailSettings;
pub use error::{AppError, Result, StorageError, ThumbnailFailure, TransformError};
pub use models::{ImageType, MetaData, StorageNode, StorePath, SUPPORTED_IMAGE_EXTENSIONS};
pub use services::storage::{FileSystemStorage, MemoryStorage, StorageClient, StorageCluster};
pub use services::thumbnail::{
    ImageTransformer, ThumbScaleSpec, ThumbSizeSpec, ThumbSpec, ThumbSpecRegistry,
    ThumbSpecSet, ThumbnailProcessor, ThumbnailUploader, ThumbnailUploaderConfig,
};

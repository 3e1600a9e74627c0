/// Error types for thumbnail group uploads
///
/// `AppError` is what the three upload entry points return. Storage and
/// transform failures have their own enums so collaborators can be written
/// against them without pulling in the orchestrator's error surface.
use crate::models::{ImageType, StorePath};

/// Result type for thumb-upload operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Rejected before any storage call (blank extension, oversized source, bad spec values)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Extension is not in the image allow-list
    #[error("Unsupported image type: {0}")]
    UnsupportedImageType(String),

    /// Thumbnail settings or spec set are inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller's source stream could not be read
    #[error("Failed to read source image: {0}")]
    SourceRead(#[from] std::io::Error),

    /// Node selection or master upload failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A thumbnail could not be produced or stored after the master was written
    #[error("Thumbnail upload failed for prefix {prefix} of {master}: {source}")]
    ThumbnailUpload {
        master: StorePath,
        prefix: String,
        #[source]
        source: ThumbnailFailure,
    },
}

impl AppError {
    /// Master of a group whose thumbnail upload failed, if any
    pub fn orphaned_master(&self) -> Option<&StorePath> {
        match self {
            AppError::ThumbnailUpload { master, .. } => Some(master),
            _ => None,
        }
    }

    /// True for errors raised before any node selection or upload happened
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            AppError::InvalidInput(_) | AppError::UnsupportedImageType(_)
        )
    }
}

/// Cause of a single thumbnail failure inside a group
#[derive(Debug, thiserror::Error)]
pub enum ThumbnailFailure {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Thumbnail task failed: {0}")]
    Task(String),
}

/// Image transform errors
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Failed to decode {image_type} image: {source}")]
    Decode {
        image_type: ImageType,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode {image_type} image: {source}")]
    Encode {
        image_type: ImageType,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid target dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Invalid scale ratio {0}")]
    InvalidRatio(f32),
}

/// Storage collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("No writable storage node available")]
    NoWritableNode,

    #[error("Storage node {node} unavailable: {message}")]
    Unavailable { node: String, message: String },

    #[error("Master file not found on node: {0}")]
    MasterNotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata encoding error: {0}")]
    Metadata(#[from] serde_json::Error),
}

//! Thumbnail group uploads
//!
//! This module provides:
//! - Specs describing each thumbnail (exact size, or scale + quality)
//! - A registry holding the default spec lists
//! - Image processor for resizing and encoding
//! - Uploader coordinating master and thumbnail uploads on one storage node

pub mod processor;
pub mod registry;
pub mod service;
pub mod spec;

pub use processor::{ImageTransformer, ThumbnailProcessor, DEFAULT_JPEG_QUALITY};
pub use registry::{ThumbSpecRegistry, ThumbSpecSet};
pub use service::{ThumbnailUploader, ThumbnailUploaderConfig};
pub use spec::{ThumbScaleSpec, ThumbSizeSpec, ThumbSpec, MAX_PREFIX_LEN};

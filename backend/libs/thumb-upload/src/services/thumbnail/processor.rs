//! Thumbnail processor - derives thumbnail bytes from an original image
//!
//! Two transforms are supported: resize to exact dimensions, and proportional
//! scale with an output quality. Output is encoded in the same format as the
//! input so the slave file can share the master's extension.
//!
//! Everything here is CPU-bound and blocking. The uploader runs it on tokio's
//! blocking pool.

use super::spec::ThumbSpec;
use crate::error::TransformError;
use crate::models::ImageType;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use std::io::Cursor;
use tracing::debug;

/// JPEG quality used when a transform has no quality of its own (0-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Turns source bytes plus a spec into thumbnail bytes
pub trait ImageTransformer: Send + Sync {
    fn transform(
        &self,
        source: &[u8],
        image_type: ImageType,
        spec: &ThumbSpec,
    ) -> Result<Bytes, TransformError>;
}

/// `image`-crate backed transformer
#[derive(Clone, Debug)]
pub struct ThumbnailProcessor {
    filter: FilterType,
    default_quality: u8,
}

impl Default for ThumbnailProcessor {
    fn default() -> Self {
        Self {
            filter: FilterType::Triangle,
            default_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ThumbnailProcessor {
    /// Create a processor with the given resampling filter and JPEG quality
    pub fn new(filter: FilterType, default_quality: u8) -> Self {
        Self {
            filter,
            default_quality: default_quality.clamp(1, 100),
        }
    }

    /// Create a processor with default configuration
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Resize to exactly `width` x `height`
    pub fn resize_to(
        &self,
        source: &[u8],
        image_type: ImageType,
        width: u32,
        height: u32,
    ) -> Result<Bytes, TransformError> {
        if width == 0 || height == 0 {
            return Err(TransformError::InvalidDimensions { width, height });
        }

        let img = decode(source, image_type)?;
        let (orig_w, orig_h) = img.dimensions();

        let resized = if (orig_w, orig_h) == (width, height) {
            img
        } else {
            img.resize_exact(width, height, self.filter)
        };

        let data = self.encode(&resized, image_type, self.default_quality)?;
        debug!(
            original_width = orig_w,
            original_height = orig_h,
            width,
            height,
            size = data.len(),
            "Resized thumbnail generated"
        );
        Ok(data)
    }

    /// Shrink by `ratio` and encode with `quality` (0.0-1.0)
    ///
    /// Output dimensions are `round(original * ratio)`, never below 1. Quality
    /// only affects lossy formats.
    pub fn scale_by(
        &self,
        source: &[u8],
        image_type: ImageType,
        ratio: f32,
        quality: f32,
    ) -> Result<Bytes, TransformError> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(TransformError::InvalidRatio(ratio));
        }

        let img = decode(source, image_type)?;
        let (orig_w, orig_h) = img.dimensions();
        let (new_w, new_h) = scaled_dimensions(orig_w, orig_h, ratio);

        let scaled = if (orig_w, orig_h) == (new_w, new_h) {
            img
        } else {
            img.resize_exact(new_w, new_h, self.filter)
        };

        let data = self.encode(&scaled, image_type, jpeg_quality(quality))?;
        debug!(
            original_width = orig_w,
            original_height = orig_h,
            width = new_w,
            height = new_h,
            ratio,
            quality,
            size = data.len(),
            "Scaled thumbnail generated"
        );
        Ok(data)
    }

    fn encode(
        &self,
        img: &DynamicImage,
        image_type: ImageType,
        quality: u8,
    ) -> Result<Bytes, TransformError> {
        let mut buf = Vec::new();
        let mut cursor = Cursor::new(&mut buf);

        let result = match image_type {
            // JPEG has no alpha channel
            ImageType::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8())
                .write_to(&mut cursor, ImageOutputFormat::Jpeg(quality)),
            ImageType::Png => img.write_to(&mut cursor, ImageOutputFormat::Png),
            ImageType::Gif => img.write_to(&mut cursor, ImageOutputFormat::Gif),
            ImageType::Bmp => img.write_to(&mut cursor, ImageOutputFormat::Bmp),
        };
        result.map_err(|source| TransformError::Encode { image_type, source })?;

        Ok(Bytes::from(buf))
    }
}

impl ImageTransformer for ThumbnailProcessor {
    fn transform(
        &self,
        source: &[u8],
        image_type: ImageType,
        spec: &ThumbSpec,
    ) -> Result<Bytes, TransformError> {
        match spec {
            ThumbSpec::Size(size) => self.resize_to(source, image_type, size.width(), size.height()),
            ThumbSpec::Scale(scale) => {
                self.scale_by(source, image_type, scale.ratio(), scale.quality())
            }
        }
    }
}

fn decode(source: &[u8], image_type: ImageType) -> Result<DynamicImage, TransformError> {
    image::load_from_memory_with_format(source, image_type.format())
        .map_err(|source| TransformError::Decode { image_type, source })
}

/// Dimensions after scaling by `ratio`, rounded, at least 1x1
fn scaled_dimensions(width: u32, height: u32, ratio: f32) -> (u32, u32) {
    let scale = |v: u32| ((f64::from(v) * f64::from(ratio)).round() as u32).max(1);
    (scale(width), scale(height))
}

/// Map a 0.0-1.0 quality onto the JPEG encoder's 1-100 range
fn jpeg_quality(quality: f32) -> u8 {
    ((quality.clamp(0.0, 1.0) * 100.0).round() as u8).max(1)
}

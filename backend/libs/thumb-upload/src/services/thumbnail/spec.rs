//! Thumbnail transform specs
//!
//! Every spec carries a prefix label. The label is appended to the master's
//! file stem to name the slave file, so it has to be short and path-safe.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest prefix label a storage node accepts for slave files
pub const MAX_PREFIX_LEN: usize = 16;

/// Resize to exact dimensions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SizeSpecRepr")]
pub struct ThumbSizeSpec {
    width: u32,
    height: u32,
    prefix: String,
}

impl ThumbSizeSpec {
    /// Size spec with the default `_{width}x{height}` prefix
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(AppError::InvalidInput(format!(
                "thumbnail size must be positive, got {width}x{height}"
            )));
        }
        Ok(Self::builtin(width, height))
    }

    /// Unvalidated constructor for compiled-in defaults
    pub(crate) fn builtin(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            prefix: format!("_{width}x{height}"),
        }
    }

    /// Replace the prefix label
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        self.prefix = validate_prefix(prefix.into())?;
        Ok(self)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Proportional shrink with an output quality
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScaleSpecRepr")]
pub struct ThumbScaleSpec {
    ratio: f32,
    quality: f32,
    prefix: String,
}

impl ThumbScaleSpec {
    /// Scale spec with the default `_s{ratio%}q{quality%}` prefix
    pub fn new(ratio: f32, quality: f32) -> Result<Self> {
        if !(ratio.is_finite() && ratio > 0.0 && ratio <= 1.0) {
            return Err(AppError::InvalidInput(format!(
                "scale ratio must be in (0, 1], got {ratio}"
            )));
        }
        if !(quality.is_finite() && (0.0..=1.0).contains(&quality)) {
            return Err(AppError::InvalidInput(format!(
                "output quality must be in [0, 1], got {quality}"
            )));
        }
        Ok(Self::builtin(ratio, quality))
    }

    /// Unvalidated constructor for compiled-in defaults
    pub(crate) fn builtin(ratio: f32, quality: f32) -> Self {
        Self {
            ratio,
            quality,
            prefix: format!(
                "_s{}q{}",
                (ratio * 100.0).round() as u32,
                (quality * 100.0).round() as u32
            ),
        }
    }

    /// Replace the prefix label
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Result<Self> {
        self.prefix = validate_prefix(prefix.into())?;
        Ok(self)
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Either kind of thumbnail transform
#[derive(Clone, Debug, PartialEq)]
pub enum ThumbSpec {
    Size(ThumbSizeSpec),
    Scale(ThumbScaleSpec),
}

impl ThumbSpec {
    pub fn prefix(&self) -> &str {
        match self {
            ThumbSpec::Size(spec) => spec.prefix(),
            ThumbSpec::Scale(spec) => spec.prefix(),
        }
    }
}

impl From<ThumbSizeSpec> for ThumbSpec {
    fn from(spec: ThumbSizeSpec) -> Self {
        ThumbSpec::Size(spec)
    }
}

impl From<ThumbScaleSpec> for ThumbSpec {
    fn from(spec: ThumbScaleSpec) -> Self {
        ThumbSpec::Scale(spec)
    }
}

impl fmt::Display for ThumbSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThumbSpec::Size(s) => write!(f, "size {}x{} ({})", s.width, s.height, s.prefix),
            ThumbSpec::Scale(s) => write!(
                f,
                "scale {:.2} quality {:.2} ({})",
                s.ratio, s.quality, s.prefix
            ),
        }
    }
}

fn validate_prefix(prefix: String) -> Result<String> {
    if prefix.is_empty() {
        return Err(AppError::InvalidInput("thumbnail prefix must not be empty".into()));
    }
    if prefix.len() > MAX_PREFIX_LEN {
        return Err(AppError::InvalidInput(format!(
            "thumbnail prefix {prefix:?} exceeds {MAX_PREFIX_LEN} bytes"
        )));
    }
    if prefix
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '.' || c.is_whitespace() || c.is_control())
    {
        return Err(AppError::InvalidInput(format!(
            "thumbnail prefix {prefix:?} contains a path separator, dot or whitespace"
        )));
    }
    Ok(prefix)
}

#[derive(Deserialize)]
struct SizeSpecRepr {
    width: u32,
    height: u32,
    #[serde(default)]
    prefix: Option<String>,
}

impl TryFrom<SizeSpecRepr> for ThumbSizeSpec {
    type Error = AppError;

    fn try_from(repr: SizeSpecRepr) -> Result<Self> {
        let spec = ThumbSizeSpec::new(repr.width, repr.height)?;
        match repr.prefix {
            Some(prefix) => spec.with_prefix(prefix),
            None => Ok(spec),
        }
    }
}

#[derive(Deserialize)]
struct ScaleSpecRepr {
    ratio: f32,
    quality: f32,
    #[serde(default)]
    prefix: Option<String>,
}

impl TryFrom<ScaleSpecRepr> for ThumbScaleSpec {
    type Error = AppError;

    fn try_from(repr: ScaleSpecRepr) -> Result<Self> {
        let spec = ThumbScaleSpec::new(repr.ratio, repr.quality)?;
        match repr.prefix {
            Some(prefix) => spec.with_prefix(prefix),
            None => Ok(spec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_spec_default_prefix() {
        let spec = ThumbSizeSpec::new(150, 100).unwrap();
        assert_eq!(spec.prefix(), "_150x100");
        assert_eq!(spec.width(), 150);
        assert_eq!(spec.height(), 100);
    }

    #[test]
    fn test_scale_spec_default_prefix() {
        let spec = ThumbScaleSpec::new(0.5, 0.8).unwrap();
        assert_eq!(spec.prefix(), "_s50q80");

        let spec = ThumbScaleSpec::new(0.25, 1.0).unwrap();
        assert_eq!(spec.prefix(), "_s25q100");
    }

    #[test]
    fn test_size_spec_rejects_zero_dimension() {
        assert!(ThumbSizeSpec::new(0, 100).is_err());
        assert!(ThumbSizeSpec::new(100, 0).is_err());
    }

    #[test]
    fn test_scale_spec_bounds() {
        assert!(ThumbScaleSpec::new(0.0, 0.5).is_err());
        assert!(ThumbScaleSpec::new(1.5, 0.5).is_err());
        assert!(ThumbScaleSpec::new(f32::NAN, 0.5).is_err());
        assert!(ThumbScaleSpec::new(0.5, -0.1).is_err());
        assert!(ThumbScaleSpec::new(0.5, 1.1).is_err());
        assert!(ThumbScaleSpec::new(1.0, 0.0).is_ok());
    }

    #[test]
    fn test_prefix_validation() {
        let spec = ThumbSizeSpec::new(10, 10).unwrap();
        assert!(spec.clone().with_prefix("").is_err());
        assert!(spec.clone().with_prefix("a/b").is_err());
        assert!(spec.clone().with_prefix("_a.b").is_err());
        assert!(spec.clone().with_prefix("has space").is_err());
        assert!(spec.clone().with_prefix("_seventeen_chars_").is_err());
        assert_eq!(spec.with_prefix("_tiny").unwrap().prefix(), "_tiny");
    }

    #[test]
    fn test_thumb_spec_prefix_dispatch() {
        let size: ThumbSpec = ThumbSizeSpec::new(64, 64).unwrap().into();
        let scale: ThumbSpec = ThumbScaleSpec::new(0.5, 0.9).unwrap().into();
        assert_eq!(size.prefix(), "_64x64");
        assert_eq!(scale.prefix(), "_s50q90");
    }

    #[test]
    fn test_deserialize_validates() {
        let spec: ThumbSizeSpec =
            serde_json::from_str(r#"{"width": 300, "height": 200}"#).unwrap();
        assert_eq!(spec.prefix(), "_300x200");

        let spec: ThumbScaleSpec =
            serde_json::from_str(r#"{"ratio": 0.3, "quality": 0.7, "prefix": "_small"}"#).unwrap();
        assert_eq!(spec.prefix(), "_small");

        let err = serde_json::from_str::<ThumbSizeSpec>(r#"{"width": 0, "height": 200}"#);
        assert!(err.is_err());
    }
}

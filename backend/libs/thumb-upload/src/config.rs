/// Configuration for thumbnail group uploads
///
/// Loads from environment variables with defaults, or deserializes as part of a
/// larger service config.
///
/// Environment variables:
/// - THUMB_SCALES: comma list of `ratio:quality[:prefix]` (default: "0.5:0.8")
/// - THUMB_SIZES: comma list of `WxH[:prefix]` (default: "150x150")
/// - THUMB_CLEANUP_ON_FAILURE: delete the group when a thumbnail fails (default: false)
/// - THUMB_MAX_SOURCE_BYTES: largest source image buffered, 0 = unlimited (default: 20971520)
use crate::error::{AppError, Result};
use crate::services::thumbnail::{ThumbScaleSpec, ThumbSizeSpec, ThumbSpecSet};
use serde::Deserialize;

/// Default cap on the buffered source image (20 MiB)
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
pub struct ThumbnailSettings {
    /// Default scale specs, in upload order
    #[serde(default = "default_scales")]
    pub scales: Vec<ThumbScaleSpec>,
    /// Default size specs, in upload order
    #[serde(default = "default_sizes")]
    pub sizes: Vec<ThumbSizeSpec>,
    /// Best-effort delete of the master and uploaded thumbnails when a thumbnail fails
    #[serde(default)]
    pub cleanup_on_failure: bool,
    /// Largest source accepted, 0 = unlimited
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            scales: default_scales(),
            sizes: default_sizes(),
            cleanup_on_failure: false,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

impl ThumbnailSettings {
    /// Load settings from `THUMB_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        if let Ok(raw) = std::env::var("THUMB_SCALES") {
            settings.scales = parse_scale_list(&raw)?;
        }
        if let Ok(raw) = std::env::var("THUMB_SIZES") {
            settings.sizes = parse_size_list(&raw)?;
        }
        if let Ok(raw) = std::env::var("THUMB_CLEANUP_ON_FAILURE") {
            settings.cleanup_on_failure = parse_bool("THUMB_CLEANUP_ON_FAILURE", &raw)?;
        }
        if let Ok(raw) = std::env::var("THUMB_MAX_SOURCE_BYTES") {
            settings.max_source_bytes = raw.trim().parse().map_err(|_| {
                AppError::Config(format!("THUMB_MAX_SOURCE_BYTES: not an integer: {raw:?}"))
            })?;
        }

        // Fail early on duplicate prefixes rather than at registry construction
        settings.spec_set()?;
        Ok(settings)
    }

    /// Prefix-checked spec set for the registry
    pub fn spec_set(&self) -> Result<ThumbSpecSet> {
        ThumbSpecSet::new(self.scales.clone(), self.sizes.clone())
    }
}

fn default_scales() -> Vec<ThumbScaleSpec> {
    vec![ThumbScaleSpec::builtin(0.5, 0.8)]
}

fn default_sizes() -> Vec<ThumbSizeSpec> {
    vec![ThumbSizeSpec::builtin(150, 150)]
}

fn default_max_source_bytes() -> usize {
    DEFAULT_MAX_SOURCE_BYTES
}

/// Parse `ratio:quality[:prefix]` entries
pub(crate) fn parse_scale_list(raw: &str) -> Result<Vec<ThumbScaleSpec>> {
    list_entries(raw)
        .map(|entry| {
            let mut parts = entry.split(':').map(str::trim);
            let ratio = parse_number("THUMB_SCALES", entry, parts.next())?;
            let quality = parse_number("THUMB_SCALES", entry, parts.next())?;
            let spec = ThumbScaleSpec::new(ratio, quality)
                .map_err(|e| AppError::Config(format!("THUMB_SCALES: {entry:?}: {e}")))?;
            with_optional_prefix("THUMB_SCALES", entry, parts, spec, |s, p| s.with_prefix(p))
        })
        .collect()
}

/// Parse `WxH[:prefix]` entries
pub(crate) fn parse_size_list(raw: &str) -> Result<Vec<ThumbSizeSpec>> {
    list_entries(raw)
        .map(|entry| {
            let mut parts = entry.split(':').map(str::trim);
            let dims = parts.next().unwrap_or_default();
            let (w, h) = dims
                .split_once(['x', 'X'])
                .ok_or_else(|| AppError::Config(format!("THUMB_SIZES: {entry:?}: expected WxH")))?;
            let width = parse_number("THUMB_SIZES", entry, Some(w.trim()))?;
            let height = parse_number("THUMB_SIZES", entry, Some(h.trim()))?;
            let spec = ThumbSizeSpec::new(width, height)
                .map_err(|e| AppError::Config(format!("THUMB_SIZES: {entry:?}: {e}")))?;
            with_optional_prefix("THUMB_SIZES", entry, parts, spec, |s, p| s.with_prefix(p))
        })
        .collect()
}

fn list_entries(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number<T: std::str::FromStr>(var: &str, entry: &str, part: Option<&str>) -> Result<T> {
    part.filter(|p| !p.is_empty())
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| AppError::Config(format!("{var}: {entry:?}: malformed number")))
}

fn with_optional_prefix<'a, S>(
    var: &str,
    entry: &str,
    mut rest: impl Iterator<Item = &'a str>,
    spec: S,
    apply: fn(S, String) -> Result<S>,
) -> Result<S> {
    let spec = match rest.next() {
        Some(prefix) => apply(spec, prefix.to_string())
            .map_err(|e| AppError::Config(format!("{var}: {entry:?}: {e}")))?,
        None => spec,
    };
    if rest.next().is_some() {
        return Err(AppError::Config(format!("{var}: {entry:?}: too many fields")));
    }
    Ok(spec)
}

fn parse_bool(var: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::Config(format!("{var}: not a boolean: {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ThumbnailSettings::default();
        assert_eq!(settings.scales.len(), 1);
        assert_eq!(settings.scales[0].prefix(), "_s50q80");
        assert_eq!(settings.sizes.len(), 1);
        assert_eq!(settings.sizes[0].prefix(), "_150x150");
        assert!(!settings.cleanup_on_failure);
        assert_eq!(settings.max_source_bytes, DEFAULT_MAX_SOURCE_BYTES);
        assert_eq!(settings.spec_set().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_scale_list() {
        let specs = parse_scale_list("0.5:0.8, 0.25:0.6:_quarter").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].prefix(), "_s50q80");
        assert_eq!(specs[1].ratio(), 0.25);
        assert_eq!(specs[1].prefix(), "_quarter");
    }

    #[test]
    fn test_parse_size_list() {
        let specs = parse_size_list("150x150,300X200:_medium").unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].prefix(), "_150x150");
        assert_eq!((specs[1].width(), specs[1].height()), (300, 200));
        assert_eq!(specs[1].prefix(), "_medium");
    }

    #[test]
    fn test_empty_list_disables_defaults() {
        assert!(parse_scale_list("").unwrap().is_empty());
        assert!(parse_size_list(" , ").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_entries() {
        assert!(matches!(parse_scale_list("0.5"), Err(AppError::Config(_))));
        assert!(matches!(parse_scale_list("abc:0.5"), Err(AppError::Config(_))));
        assert!(matches!(parse_scale_list("2.0:0.5"), Err(AppError::Config(_))));
        assert!(matches!(parse_scale_list("0.5:0.5:_a:_b"), Err(AppError::Config(_))));
        assert!(matches!(parse_size_list("150"), Err(AppError::Config(_))));
        assert!(matches!(parse_size_list("0x10"), Err(AppError::Config(_))));
        assert!(matches!(parse_size_list("10x10:a/b"), Err(AppError::Config(_))));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", " ON ").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let settings: ThumbnailSettings = serde_json::from_str(
            r#"{"sizes": [{"width": 64, "height": 64}], "cleanup_on_failure": true}"#,
        )
        .unwrap();
        assert_eq!(settings.scales[0].prefix(), "_s50q80");
        assert_eq!(settings.sizes[0].prefix(), "_64x64");
        assert!(settings.cleanup_on_failure);
        assert_eq!(settings.max_source_bytes, DEFAULT_MAX_SOURCE_BYTES);
    }
}

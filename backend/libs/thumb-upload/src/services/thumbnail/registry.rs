//! Default thumbnail specs
//!
//! The registry hands out immutable snapshots. An upload takes one snapshot when
//! it starts and keeps it for the whole group, so a `replace` running
//! concurrently never half-applies to a group.

use super::spec::{ThumbScaleSpec, ThumbSizeSpec};
use crate::config::ThumbnailSettings;
use crate::error::{AppError, Result};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// An immutable, prefix-unique set of default specs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThumbSpecSet {
    scales: Vec<ThumbScaleSpec>,
    sizes: Vec<ThumbSizeSpec>,
}

impl ThumbSpecSet {
    /// Build a set, rejecting duplicate prefixes across both lists
    ///
    /// `upload_auto` applies scales and sizes together, so a prefix may appear
    /// only once in the union.
    pub fn new(scales: Vec<ThumbScaleSpec>, sizes: Vec<ThumbSizeSpec>) -> Result<Self> {
        let mut seen = HashSet::new();
        let prefixes = scales
            .iter()
            .map(ThumbScaleSpec::prefix)
            .chain(sizes.iter().map(ThumbSizeSpec::prefix));
        for prefix in prefixes {
            if !seen.insert(prefix) {
                return Err(AppError::Config(format!(
                    "duplicate thumbnail prefix {prefix:?}"
                )));
            }
        }
        Ok(Self { scales, sizes })
    }

    pub fn scale_specs(&self) -> &[ThumbScaleSpec] {
        &self.scales
    }

    pub fn size_specs(&self) -> &[ThumbSizeSpec] {
        &self.sizes
    }

    /// Number of thumbnails `upload_auto` produces with this set
    pub fn len(&self) -> usize {
        self.scales.len() + self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holder of the current default spec set
#[derive(Debug, Default)]
pub struct ThumbSpecRegistry {
    current: RwLock<Arc<ThumbSpecSet>>,
}

impl ThumbSpecRegistry {
    pub fn new(set: ThumbSpecSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// Registry seeded from loaded settings
    pub fn from_settings(settings: &ThumbnailSettings) -> Result<Self> {
        Ok(Self::new(settings.spec_set()?))
    }

    /// The set in effect right now
    pub fn snapshot(&self) -> Arc<ThumbSpecSet> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a new set, returning the previous one
    ///
    /// Snapshots already taken keep pointing at the previous set.
    pub fn replace(&self, set: ThumbSpecSet) -> Arc<ThumbSpecSet> {
        let next = Arc::new(set);
        info!(
            scales = next.scale_specs().len(),
            sizes = next.size_specs().len(),
            "Thumbnail spec set replaced"
        );
        std::mem::replace(&mut *self.current.write(), next)
    }

    pub fn default_scale_specs(&self) -> Vec<ThumbScaleSpec> {
        self.snapshot().scale_specs().to_vec()
    }

    pub fn default_size_specs(&self) -> Vec<ThumbSizeSpec> {
        self.snapshot().size_specs().to_vec()
    }
}

//! Core upload data models

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extensions accepted for master + thumbnail uploads
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];

/// Image types the transform engine can decode and re-encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl ImageType {
    /// Resolve a file extension (case-insensitive, leading dot optional)
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = normalize_extension(ext);
        match ext.as_str() {
            "jpg" | "jpeg" => Some(ImageType::Jpeg),
            "png" => Some(ImageType::Png),
            "gif" => Some(ImageType::Gif),
            "bmp" => Some(ImageType::Bmp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpeg",
            ImageType::Png => "png",
            ImageType::Gif => "gif",
            ImageType::Bmp => "bmp",
        }
    }

    /// Decoder/encoder format in the `image` crate
    pub fn format(&self) -> ImageFormat {
        match self {
            ImageType::Jpeg => ImageFormat::Jpeg,
            ImageType::Png => ImageFormat::Png,
            ImageType::Gif => ImageFormat::Gif,
            ImageType::Bmp => ImageFormat::Bmp,
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase an extension and strip surrounding whitespace and a leading dot
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Name/value pair attached to a master file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetaData {
    pub name: String,
    pub value: String,
}

impl MetaData {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A writable storage node chosen for one upload group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageNode {
    /// Cluster group the node belongs to
    pub group_name: String,
    /// `host:port` of the node
    pub address: String,
    /// Store path index on the node (the `Mxx` segment of generated paths)
    pub store_path_index: u8,
}

impl StorageNode {
    pub fn new(group_name: impl Into<String>, address: impl Into<String>, store_path_index: u8) -> Self {
        Self {
            group_name: group_name.into(),
            address: address.into(),
            store_path_index,
        }
    }
}

impl fmt::Display for StorageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.group_name, self.address)
    }
}

/// Location of a master file: cluster group plus path relative to the group
///
/// Thumbnails are never handed out as separate `StorePath`s by the uploader.
/// Their location is derived from the master with [`StorePath::slave_path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorePath {
    pub group: String,
    pub path: String,
}

impl StorePath {
    pub fn new(group: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            path: path.into(),
        }
    }

    /// `group/path`
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.group, self.path)
    }

    /// Parse a `group/path` string
    pub fn parse(full_path: &str) -> Option<Self> {
        let (group, path) = full_path.trim_start_matches('/').split_once('/')?;
        if group.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self::new(group, path))
    }

    /// Relative path of the slave file stored under `prefix`
    ///
    /// `M00/00/1A/abc.jpg` + `_150x150` + `jpg` -> `M00/00/1A/abc_150x150.jpg`.
    /// An empty `ext` keeps the master's own extension.
    pub fn slave_path(&self, prefix: &str, ext: &str) -> String {
        let file_start = self.path.rfind('/').map_or(0, |i| i + 1);
        let stem_end = self.path[file_start..]
            .rfind('.')
            .map_or(self.path.len(), |i| file_start + i);
        let stem = &self.path[..stem_end];

        let ext = normalize_extension(ext);
        if ext.is_empty() {
            format!("{}{}{}", stem, prefix, &self.path[stem_end..])
        } else {
            format!("{}{}.{}", stem, prefix, ext)
        }
    }

    /// Slave location in the same group as the master
    pub fn slave(&self, prefix: &str, ext: &str) -> StorePath {
        StorePath::new(self.group.clone(), self.slave_path(prefix, ext))
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.path)
    }
}

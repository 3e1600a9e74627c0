/// Service layer for image group uploads
///
/// - Storage: cluster node selection and the master/slave file client
/// - Thumbnail: spec registry, image processing and the group uploader
pub mod storage;
pub mod thumbnail;

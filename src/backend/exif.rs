//! EXIF reader contract implementations.
//!
//! Image decoding is owned by the embedding application; the pipeline only
//! needs whatever metadata the caller can supply. Both implementations here
//! are infallible, matching the best-effort contract.

use async_trait::async_trait;

use super::{BackendError, ExifReader};
use crate::model::{ImageMetadata, ImageRef};

/// Reader that always reports empty metadata, for callers without an EXIF
/// source
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExif;

#[async_trait]
impl ExifReader for NoExif {
    async fn read(&self, _image: &ImageRef) -> Result<ImageMetadata, BackendError> {
        Ok(ImageMetadata::default())
    }
}

/// Reader that returns caller-supplied metadata, for front ends that have
/// already extracted EXIF and for tests
#[derive(Debug, Clone, Default)]
pub struct StaticExif {
    metadata: ImageMetadata,
}

impl StaticExif {
    pub fn new(metadata: ImageMetadata) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl ExifReader for StaticExif {
    async fn read(&self, _image: &ImageRef) -> Result<ImageMetadata, BackendError> {
        Ok(self.metadata.clone())
    }
}

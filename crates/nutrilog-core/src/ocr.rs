//! OCR boundary for photographed menus and labels.

use async_trait::async_trait;

use crate::error::Result;

/// Extracts text from an image. An optional capability: hosts without
/// OCR simply do not wire one and image messages get a degraded reply.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Returns `Ok(None)` when the image contains no recognizable text.
    async fn extract_text(&self, image: &[u8]) -> Result<Option<String>>;
}

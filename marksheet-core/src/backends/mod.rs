//! Recognition backends
//!
//! The two collaborators the extraction chain drives. Both are traits so the
//! processor can be built with in-process fakes; the concrete implementations
//! shell out to local OCR tools or call a hosted vision-language model.
//!
//! ```text
//! image / PDF on disk
//!     ├── VisionClient      (prompt + image → JSON reply)
//!     └── RecognitionEngine (file → raw text + confidence)
//! ```

use std::path::Path;

use crate::error::BackendError;
use crate::types::{MediaType, RawRecognitionResult};

pub mod process;
pub mod tesseract;

#[cfg(feature = "vision-backend")]
pub mod openai;

pub use tesseract::TesseractEngine;

#[cfg(feature = "vision-backend")]
pub use openai::OpenAiVisionClient;

/// One call to a vision-language model
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    /// Fixed instruction prompt describing the JSON shape to return
    pub prompt: &'a str,
    /// Raw image bytes; encoding for the wire is the client's concern
    pub image: &'a [u8],
    pub media_type: MediaType,
}

/// Hosted vision-language model
pub trait VisionClient: Send + Sync {
    /// Returns the model's reply text, expected to hold a JSON object
    fn complete(&self, request: &VisionRequest<'_>) -> Result<String, BackendError>;

    /// Backend identifier for logging/debugging
    fn name(&self) -> &str;
}

/// Local OCR / document text engine
pub trait RecognitionEngine: Send + Sync {
    /// Recognize text from a file on disk.
    ///
    /// Images come back with the engine's native confidence. Text-native
    /// documents come back with `confidence: None`; the caller assigns a
    /// nominal value.
    fn recognize(
        &self,
        path: &Path,
        media_type: MediaType,
        language: &str,
    ) -> Result<RawRecognitionResult, BackendError>;

    /// Backend identifier for logging/debugging
    fn name(&self) -> &str;
}

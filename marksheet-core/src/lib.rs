// Marksheet Core Library
//
// Turns an uploaded marksheet image or PDF into a structured, reviewable
// record: vision-model extraction when configured, local OCR plus text rules
// otherwise, and a reconciliation pass that fills derived fields.

pub mod types;
pub mod error;
pub mod config;
pub mod normalizer;
pub mod classifier;
pub mod rules;
pub mod backends;
pub mod extractors;
pub mod reconcile;
pub mod processor;
pub mod upload;
pub mod serialization;

// Re-export main types and functions for easy use
pub use types::*;
pub use error::{BackendAttempt, BackendError, ExtractionError};
pub use config::ExtractionConfig;
pub use backends::{RecognitionEngine, TesseractEngine, VisionClient, VisionRequest};
pub use extractors::{Extractor, LocalExtractor, VisionExtractor};
pub use processor::{ExtractionStages, MarksheetProcessor, StepProfiler};
pub use upload::{TempUpload, UploadStore};

// Re-export backends for direct use
#[cfg(feature = "vision-backend")]
pub use backends::OpenAiVisionClient;

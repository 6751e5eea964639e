use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::backends::{RecognitionEngine, TesseractEngine, VisionClient};
use crate::classifier::PaperTypeClassifier;
use crate::config::ExtractionConfig;
use crate::error::{BackendAttempt, BackendError, ExtractionError};
use crate::extractors::{Extractor, LocalExtractor, VisionExtractor};
use crate::normalizer::TextNormalizer;
use crate::reconcile::reconcile;
use crate::rules::TextRuleEngine;
use crate::types::{DraftMarksheet, ExtractedMarksheet, ExtractionDiagnostics, MediaType};
use crate::upload::{discard, TempUpload};

/// Captured intermediate outputs of one extraction
/// Used for testing and diagnostics
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExtractionStages {
    /// OCR text, PDF text layer, or the vision model's reply
    pub raw_text: String,
    pub lines: Vec<String>,
    pub marksheet: ExtractedMarksheet,
}

/// Simple profiler that collects timings for pipeline steps
pub struct StepProfiler {
    enabled: bool,
    timings: Vec<(String, Duration)>,
}

impl StepProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time_step<F, R>(&mut self, step_name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.enabled {
            return f();
        }

        let start = Instant::now();
        let result = f();
        self.record(step_name, start.elapsed());
        result
    }

    /// Add a timing measured elsewhere
    pub fn record(&mut self, step_name: &str, elapsed: Duration) {
        if self.enabled {
            debug!(step = step_name, elapsed_ms = elapsed.as_millis() as u64, "step finished");
            self.timings.push((step_name.to_string(), elapsed));
        }
    }

    pub fn timings(&self) -> &[(String, Duration)] {
        &self.timings
    }

    pub fn print_summary(&self) {
        if !self.enabled || self.timings.is_empty() {
            return;
        }

        println!("\nPerformance Summary:");
        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();

        for (step, duration) in &self.timings {
            let percentage = if total.is_zero() {
                0.0
            } else {
                (duration.as_secs_f64() / total.as_secs_f64()) * 100.0
            };
            println!(
                "   {:.<35} {:.0}ms ({:.1}%)",
                step,
                duration.as_millis(),
                percentage
            );
        }
        println!("   {:.<35} {:.0}ms", "Total", total.as_millis());
    }
}

/// Extraction orchestrator.
///
/// Holds an ordered chain of strategies (vision first when configured, local
/// recognition last) and returns the first draft any of them produces, after
/// reconciliation. Each call is independent; nothing is shared between
/// uploads except the immutable configuration.
pub struct MarksheetProcessor {
    config: ExtractionConfig,
    chain: Vec<Extractor>,
    /// Backends left out of the chain at construction, with the reason
    unavailable: Vec<(String, String)>,
    classifier: PaperTypeClassifier,
    normalizer: TextNormalizer,
}

impl MarksheetProcessor {
    /// Create MarksheetProcessor with full dependency injection
    pub fn new_with_dependencies(
        config: ExtractionConfig,
        vision: Option<Box<dyn VisionClient>>,
        engine: Box<dyn RecognitionEngine>,
    ) -> Result<Self> {
        let mut chain = Vec::new();
        if let Some(client) = vision {
            chain.push(Extractor::Vision(VisionExtractor::new(
                client,
                config.vision.nominal_confidence,
            )));
        }
        chain.push(Extractor::Local(LocalExtractor::new(
            engine,
            TextRuleEngine::new(&config)?,
            &config.local.language,
            config.local.text_layer_confidence,
        )));

        Ok(Self {
            normalizer: TextNormalizer::new(&config.normalizer),
            config,
            chain,
            unavailable: Vec::new(),
            classifier: PaperTypeClassifier::new(),
        })
    }

    /// Build the production chain: hosted vision model when an API key
    /// resolves, then tesseract/poppler
    pub fn from_config(config: ExtractionConfig) -> Result<Self> {
        let (vision, unavailable) = configured_vision_client(&config);
        let engine = Box::new(TesseractEngine::new(&config.local));
        let mut processor = Self::new_with_dependencies(config, vision, engine)?;
        processor.unavailable.extend(unavailable);
        Ok(processor)
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Backend names in the order they are tried
    pub fn chain_names(&self) -> Vec<String> {
        self.chain
            .iter()
            .map(|extractor| extractor.name().to_string())
            .collect()
    }

    /// Extract a staged upload. The upload is removed when this returns,
    /// whether extraction succeeded or not.
    pub fn extract(&self, upload: TempUpload) -> Result<ExtractedMarksheet, ExtractionError> {
        let mut profiler = StepProfiler::new(false);
        self.extract_upload(&upload, &mut profiler)
            .map(|(marksheet, _)| marksheet)
    }

    /// Extract a file already written to temporary storage; the file is consumed
    pub fn extract_path(
        &self,
        path: impl Into<PathBuf>,
        media_type: MediaType,
    ) -> Result<ExtractedMarksheet, ExtractionError> {
        self.extract(TempUpload::adopt(path, media_type))
    }

    /// Same as [`Self::extract_path`] with a declared MIME type. An
    /// unrecognized type is a failure, and the file is still removed.
    pub fn extract_declared(
        &self,
        path: impl Into<PathBuf>,
        declared_mime: &str,
    ) -> Result<ExtractedMarksheet, ExtractionError> {
        let path = path.into();
        match MediaType::from_mime(declared_mime) {
            Some(media_type) => self.extract_path(path, media_type),
            None => {
                discard(&path);
                Err(ExtractionError::UnsupportedMediaType(declared_mime.to_string()))
            }
        }
    }

    /// Extract with per-step timings printed at the end
    pub fn extract_with_profiling(
        &self,
        upload: TempUpload,
        profile: bool,
    ) -> Result<ExtractedMarksheet, ExtractionError> {
        let start_time = Instant::now();
        let mut profiler = StepProfiler::new(profile);
        let result = self
            .extract_upload(&upload, &mut profiler)
            .map(|(marksheet, _)| marksheet);
        drop(upload);

        profiler.print_summary();
        debug!(elapsed_ms = start_time.elapsed().as_millis() as u64, "extraction finished");
        result
    }

    /// Extract and capture raw text and normalized lines alongside the result
    pub fn extract_capture_stages(
        &self,
        upload: TempUpload,
    ) -> Result<ExtractionStages, ExtractionError> {
        let mut profiler = StepProfiler::new(false);
        let (marksheet, raw_text) = self.extract_upload(&upload, &mut profiler)?;
        let lines = self.normalizer.normalize(&raw_text).lines;
        info!(
            raw_chars = raw_text.len(),
            lines = lines.len(),
            subjects = marksheet.subjects.len(),
            "stages captured"
        );

        Ok(ExtractionStages {
            raw_text,
            lines,
            marksheet,
        })
    }

    fn extract_upload(
        &self,
        upload: &TempUpload,
        profiler: &mut StepProfiler,
    ) -> Result<(ExtractedMarksheet, String), ExtractionError> {
        let path = upload.path();
        let media_type = upload.media_type();

        std::fs::metadata(path).map_err(|source| ExtractionError::UnreadableUpload {
            path: path.to_path_buf(),
            source,
        })?;

        let (draft, extractor, attempts) = self.run_chain(path, media_type, profiler)?;

        let diagnostics = ExtractionDiagnostics {
            backend: extractor.name().to_string(),
            rejected_lines: draft.rejected_lines,
            failed_attempts: attempts.iter().map(|attempt| attempt.to_string()).collect(),
        };
        let raw_text = draft.raw_text.clone();

        let marksheet = profiler.time_step("reconcile", || {
            reconcile(
                draft,
                extractor.source(),
                diagnostics,
                self.config.low_confidence_threshold,
            )
        });

        info!(
            backend = %marksheet.diagnostics.backend,
            subjects = marksheet.subjects.len(),
            confidence = marksheet.confidence,
            low_confidence = marksheet.is_low_confidence(),
            "marksheet extracted"
        );
        Ok((marksheet, raw_text))
    }

    /// Try each strategy once, in order; the first success wins
    fn run_chain(
        &self,
        path: &Path,
        media_type: MediaType,
        profiler: &mut StepProfiler,
    ) -> Result<(DraftMarksheet, &Extractor, Vec<BackendAttempt>), ExtractionError> {
        let mut attempts: Vec<BackendAttempt> = self
            .unavailable
            .iter()
            .map(|(backend, reason)| BackendAttempt {
                backend: backend.clone(),
                error: BackendError::NotConfigured(reason.clone()),
            })
            .collect();

        for extractor in &self.chain {
            if !extractor.supports(media_type) {
                debug!(backend = extractor.name(), %media_type, "backend does not support media type");
                attempts.push(BackendAttempt {
                    backend: extractor.name().to_string(),
                    error: BackendError::Unsupported(media_type),
                });
                continue;
            }

            info!(backend = extractor.name(), %media_type, "extracting");
            let step_name = format!("extract ({})", extractor.name());
            let outcome = profiler.time_step(&step_name, || {
                extractor.extract(path, media_type, &self.classifier)
            });

            if let Extractor::Local(local) = extractor {
                for (rule, elapsed) in local.rules().take_timings() {
                    profiler.record(&format!("  rule: {rule}"), elapsed);
                }
            }

            match outcome {
                Ok(draft) => return Ok((draft, extractor, attempts)),
                Err(error) => {
                    warn!(backend = extractor.name(), error = %error, "backend failed, falling back");
                    attempts.push(BackendAttempt {
                        backend: extractor.name().to_string(),
                        error,
                    });
                }
            }
        }

        warn!(attempts = attempts.len(), "every backend failed");
        Err(ExtractionError::AllBackendsFailed { attempts })
    }
}

#[cfg(feature = "vision-backend")]
fn configured_vision_client(
    config: &ExtractionConfig,
) -> (Option<Box<dyn VisionClient>>, Option<(String, String)>) {
    use crate::backends::OpenAiVisionClient;

    if !config.vision.enabled {
        info!("vision backend disabled in config");
        return (None, None);
    }

    match OpenAiVisionClient::new(&config.vision) {
        Ok(client) => {
            info!(model = %config.vision.model, "vision backend configured");
            (Some(Box::new(client)), None)
        }
        Err(err) => {
            info!(reason = %err, "vision backend unavailable, using local recognition only");
            (None, Some(("openai-vision".to_string(), err.to_string())))
        }
    }
}

#[cfg(not(feature = "vision-backend"))]
fn configured_vision_client(
    _config: &ExtractionConfig,
) -> (Option<Box<dyn VisionClient>>, Option<(String, String)>) {
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiler_disabled_records_nothing() {
        let mut profiler = StepProfiler::new(false);
        let value = profiler.time_step("noop", || 7);
        profiler.record("elsewhere", Duration::from_millis(3));
        assert_eq!(value, 7);
        assert!(profiler.timings().is_empty());
    }

    #[test]
    fn test_profiler_enabled_records_steps() {
        let mut profiler = StepProfiler::new(true);
        profiler.time_step("first", || ());
        profiler.record("second", Duration::from_millis(3));
        let names: Vec<_> = profiler.timings().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_from_config_without_key_uses_local_only() {
        let mut config = ExtractionConfig::default();
        config.vision.api_key = None;
        config.vision.api_key_env = "MARKSHEET_TEST_UNSET_KEY_VARIABLE".to_string();

        let processor = MarksheetProcessor::from_config(config).unwrap();
        assert_eq!(processor.chain_names(), vec!["tesseract".to_string()]);
    }
}

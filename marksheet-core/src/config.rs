use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_low_confidence_threshold() -> u8 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Cloud vision-language model settings
    #[serde(default)]
    pub vision: VisionConfig,
    /// Local OCR engine and PDF text-layer settings
    #[serde(default)]
    pub local: LocalOcrConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub subject_table: SubjectTableConfig,
    /// Confidence strictly below this attaches a review warning
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: u8,
    /// Where uploads are staged; defaults to `<tmp>/marksheet-uploads`
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            vision: VisionConfig::default(),
            local: LocalOcrConfig::default(),
            normalizer: NormalizerConfig::default(),
            subject_table: SubjectTableConfig::default(),
            low_confidence_threshold: default_low_confidence_threshold(),
            upload_dir: None,
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    1500
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_vision_confidence() -> u8 {
    95
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Inline key; takes precedence over `api_key_env`
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is absent
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Confidence attached to vision-model results (the model reports none)
    #[serde(default = "default_vision_confidence")]
    pub nominal_confidence: u8,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            api_key_env: default_api_key_env(),
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            nominal_confidence: default_vision_confidence(),
        }
    }
}

impl VisionConfig {
    /// Resolve the API credential; `None` means the backend is not configured
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_tesseract_cmd() -> String {
    "tesseract".to_string()
}

fn default_pdftotext_cmd() -> String {
    "pdftotext".to_string()
}

fn default_pdftoppm_cmd() -> String {
    "pdftoppm".to_string()
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_psm() -> Option<u8> {
    Some(6) // assume a single uniform block of text, keeps table rows together
}

fn default_text_layer_confidence() -> u8 {
    90
}

fn default_min_text_layer_chars() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOcrConfig {
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,
    #[serde(default = "default_pdftotext_cmd")]
    pub pdftotext_cmd: String,
    #[serde(default = "default_pdftoppm_cmd")]
    pub pdftoppm_cmd: String,
    /// Tesseract language hint
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_psm")]
    pub page_segmentation_mode: Option<u8>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Nominal confidence for PDFs read from their text layer
    #[serde(default = "default_text_layer_confidence")]
    pub text_layer_confidence: u8,
    /// OCR the first page when a PDF text layer is (nearly) empty
    #[serde(default = "default_true")]
    pub rasterize_empty_pdfs: bool,
    #[serde(default = "default_min_text_layer_chars")]
    pub min_text_layer_chars: usize,
}

impl Default for LocalOcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: default_tesseract_cmd(),
            pdftotext_cmd: default_pdftotext_cmd(),
            pdftoppm_cmd: default_pdftoppm_cmd(),
            language: default_language(),
            page_segmentation_mode: default_psm(),
            timeout_secs: default_timeout_secs(),
            text_layer_confidence: default_text_layer_confidence(),
            rasterize_empty_pdfs: true,
            min_text_layer_chars: default_min_text_layer_chars(),
        }
    }
}

impl LocalOcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_min_line_chars() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Lines shorter than this (in characters) are dropped as noise
    #[serde(default = "default_min_line_chars")]
    pub min_line_chars: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_line_chars: default_min_line_chars(),
        }
    }
}

fn default_max_internal_marks() -> u32 {
    30
}

fn default_max_external_marks() -> u32 {
    100
}

fn default_assumed_max_marks() -> u32 {
    100 // 25 internal + 75 external
}

fn default_pass_fraction() -> f32 {
    0.40
}

fn default_lookback_lines() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectTableConfig {
    /// Upper bound for a plausible internal (continuous assessment) mark
    #[serde(default = "default_max_internal_marks")]
    pub max_internal_marks: u32,
    /// Upper bound for a plausible external (exam) mark
    #[serde(default = "default_max_external_marks")]
    pub max_external_marks: u32,
    /// Maximum used for the fallback pass check when the line shows none
    #[serde(default = "default_assumed_max_marks")]
    pub assumed_max_marks: u32,
    /// Fraction of the maximum needed to pass when no result token was read
    #[serde(default = "default_pass_fraction")]
    pub pass_fraction: f32,
    /// How many preceding lines a bare subject code may borrow its name from
    #[serde(default = "default_lookback_lines")]
    pub lookback_lines: usize,
    /// Additional lowercase header/footer terms to skip
    #[serde(default)]
    pub extra_header_keywords: Vec<String>,
}

impl Default for SubjectTableConfig {
    fn default() -> Self {
        Self {
            max_internal_marks: default_max_internal_marks(),
            max_external_marks: default_max_external_marks(),
            assumed_max_marks: default_assumed_max_marks(),
            pass_fraction: default_pass_fraction(),
            lookback_lines: default_lookback_lines(),
            extra_header_keywords: Vec::new(),
        }
    }
}

impl SubjectTableConfig {
    /// Minimum marks needed to pass out of `max`
    pub fn pass_mark(&self, max: u32) -> f32 {
        max as f32 * self.pass_fraction
    }
}

impl ExtractionConfig {
    /// Load config from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        let config: ExtractionConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load config with fallback to default
    pub fn load_with_fallback(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|err| {
                warn!(path = p, error = %err, "failed to load config, using defaults");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("marksheet-uploads"))
    }
}

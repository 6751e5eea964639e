use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ===== RECOGNITION INPUT =====

/// Raw output of a recognition backend (OCR engine or text layer).
/// Immutable input to the text pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecognitionResult {
    pub text: String,
    /// 0-100; `None` for text-native documents where the caller assigns a nominal value
    pub confidence: Option<u8>,
}

impl RawRecognitionResult {
    pub fn new(text: impl Into<String>, confidence: Option<u8>) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.map(|c| c.min(100)),
        }
    }
}

/// Declared media type of an uploaded marksheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
    Tiff,
    Pdf,
}

impl MediaType {
    /// Parse a MIME type such as `image/png` or `application/pdf`
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::Webp),
            "image/gif" => Some(Self::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(Self::Bmp),
            "image/tiff" => Some(Self::Tiff),
            "application/pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Guess from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Pdf => "pdf",
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, Self::Pdf)
    }

    /// Formats accepted as inline images by chat-completion vision models
    pub fn is_vision_supported(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg | Self::Webp | Self::Gif)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

// ===== SUBJECT RECORDS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaperType {
    #[default]
    Core,
    Allied,
    Practical,
    Non,
}

impl PaperType {
    /// Parse an explicit label ("CORE", "Allied", "practical", "NON"...)
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "CORE" => Some(Self::Core),
            "ALLIED" => Some(Self::Allied),
            "PRACTICAL" => Some(Self::Practical),
            "NON" | "NON-CORE" | "NONE" => Some(Self::Non),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "CORE",
            Self::Allied => "ALLIED",
            Self::Practical => "PRACTICAL",
            Self::Non => "NON",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubjectResult {
    Pass,
    Fail,
}

impl SubjectResult {
    /// Token normalization: anything starting with "P" passes, "F" fails
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().chars().next()?.to_ascii_uppercase() {
            'P' => Some(Self::Pass),
            'F' => Some(Self::Fail),
            _ => None,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Whether a value was read off the document or derived by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    Extracted,
    Computed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub subject_name: String,
    pub paper_type: PaperType,
    /// internal + external when both are recognized
    pub marks: u32,
    pub result: Option<SubjectResult>,
    pub result_source: Option<ValueSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_marks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_marks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_marks: Option<u32>,
}

// ===== EXTRACTION OUTPUT =====

/// Which strategy produced a marksheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    Vision,
    Local,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDiagnostics {
    /// Name of the backend whose output was used
    pub backend: String,
    /// Candidate lines that failed every grammar or the plausibility filters
    pub rejected_lines: usize,
    /// "backend: reason" for every backend tried before the successful one
    pub failed_attempts: Vec<String>,
}

/// Best-effort structured record handed to the review form.
/// Never persisted directly; see [`ExtractedMarksheet::to_subject_rows`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMarksheet {
    pub student_name: String,
    pub register_number: String,
    pub subjects: Vec<SubjectRecord>,
    /// Numeric-as-text; empty when neither detected nor derivable
    pub total_marks: String,
    pub total_marks_source: Option<ValueSource>,
    pub overall_result: Option<SubjectResult>,
    pub overall_result_source: Option<ValueSource>,
    pub confidence: u8,
    pub warning: Option<String>,
    pub source: ExtractionSource,
    #[serde(default)]
    pub diagnostics: ExtractionDiagnostics,
}

/// Subject row in the shape the student/marks storage layer inserts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRow {
    pub name: String,
    /// External component of the marks
    pub mark: u32,
    pub paper_type: PaperType,
    pub overall_max_marks: u32,
    pub internal_marks: u32,
}

/// Storage defaults for a marks row when the document did not show them
pub const DEFAULT_OVERALL_MAX_MARKS: u32 = 75;
pub const DEFAULT_INTERNAL_MAX_MARKS: u32 = 25;

impl ExtractedMarksheet {
    pub fn is_low_confidence(&self) -> bool {
        self.warning.is_some()
    }

    /// Sum of all subject marks
    pub fn subject_marks_sum(&self) -> u32 {
        self.subjects
            .iter()
            .fold(0u32, |sum, s| sum.saturating_add(s.marks))
    }

    /// Map subjects one-to-one onto storage rows
    pub fn to_subject_rows(&self) -> Vec<SubjectRow> {
        self.subjects
            .iter()
            .map(|subject| {
                let internal = subject.internal_marks.unwrap_or(0);
                let mark = subject
                    .external_marks
                    .unwrap_or_else(|| subject.marks.saturating_sub(internal));
                let overall_max_marks = subject
                    .max_marks
                    .map(|max| max.saturating_sub(DEFAULT_INTERNAL_MAX_MARKS))
                    .filter(|max| *max > 0)
                    .unwrap_or(DEFAULT_OVERALL_MAX_MARKS);
                SubjectRow {
                    name: subject.subject_name.clone(),
                    mark,
                    paper_type: subject.paper_type,
                    overall_max_marks,
                    internal_marks: internal,
                }
            })
            .collect()
    }
}

// ===== INTERMEDIATE =====

/// Partial record produced by either extraction strategy before
/// post-processing fills derived fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftMarksheet {
    pub student_name: Option<String>,
    pub register_number: Option<String>,
    pub subjects: Vec<SubjectRecord>,
    pub total_marks: Option<String>,
    pub overall_result: Option<SubjectResult>,
    pub confidence: Option<u8>,
    pub rejected_lines: usize,
    /// Text the draft was built from (OCR text or model response)
    pub raw_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(name: &str, marks: u32, internal: Option<u32>, external: Option<u32>) -> SubjectRecord {
        SubjectRecord {
            subject_name: name.to_string(),
            paper_type: PaperType::Core,
            marks,
            result: Some(SubjectResult::Pass),
            result_source: Some(ValueSource::Extracted),
            internal_marks: internal,
            external_marks: external,
            max_marks: None,
        }
    }

    #[test]
    fn test_result_token_normalization() {
        assert_eq!(SubjectResult::from_token("PASS"), Some(SubjectResult::Pass));
        assert_eq!(SubjectResult::from_token("p"), Some(SubjectResult::Pass));
        assert_eq!(SubjectResult::from_token("Failed"), Some(SubjectResult::Fail));
        assert_eq!(SubjectResult::from_token("RA"), None);
        assert_eq!(SubjectResult::from_token(""), None);
    }

    #[test]
    fn test_media_type_detection() {
        assert_eq!(MediaType::from_mime("image/jpeg"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_mime("application/pdf; charset=binary"), Some(MediaType::Pdf));
        assert_eq!(MediaType::from_mime("text/plain"), None);
        assert_eq!(MediaType::from_path(Path::new("scan.JPG")), Some(MediaType::Jpeg));
        assert!(MediaType::Png.is_vision_supported());
        assert!(!MediaType::Tiff.is_vision_supported());
        assert!(!MediaType::Pdf.is_image());
    }

    #[test]
    fn test_paper_type_labels() {
        assert_eq!(PaperType::from_label(" allied "), Some(PaperType::Allied));
        assert_eq!(PaperType::from_label("elective"), None);
        assert_eq!(serde_json::to_string(&PaperType::Practical).unwrap(), "\"PRACTICAL\"");
    }

    #[test]
    fn test_subject_rows_split_components() {
        let sheet = ExtractedMarksheet {
            student_name: String::new(),
            register_number: String::new(),
            subjects: vec![
                subject("MATHEMATICS", 70, Some(18), Some(52)),
                subject("ENGLISH", 64, None, None),
            ],
            total_marks: "134".to_string(),
            total_marks_source: Some(ValueSource::Computed),
            overall_result: Some(SubjectResult::Pass),
            overall_result_source: Some(ValueSource::Computed),
            confidence: 80,
            warning: None,
            source: ExtractionSource::Local,
            diagnostics: ExtractionDiagnostics::default(),
        };

        let rows = sheet.to_subject_rows();
        assert_eq!(rows[0].mark, 52);
        assert_eq!(rows[0].internal_marks, 18);
        assert_eq!(rows[1].mark, 64);
        assert_eq!(rows[1].internal_marks, 0);
        assert_eq!(rows[1].overall_max_marks, DEFAULT_OVERALL_MAX_MARKS);
        assert_eq!(sheet.subject_marks_sum(), 134);
    }

    #[test]
    fn test_marksheet_serializes_camel_case() {
        let raw = RawRecognitionResult::new("x", Some(140));
        assert_eq!(raw.confidence, Some(100));

        let value = serde_json::to_value(subject("PHYSICS", 60, None, None)).unwrap();
        assert_eq!(value["subjectName"], "PHYSICS");
        assert_eq!(value["paperType"], "CORE");
        assert_eq!(value["result"], "PASS");
        assert!(value.get("internalMarks").is_none());
    }
}

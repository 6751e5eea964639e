//! Extraction strategies
//!
//! Two alternative ways of turning an upload into a [`DraftMarksheet`]:
//! ask a vision-language model for structured JSON, or recognize text locally
//! and run the text rules over it. [`Extractor`] is the closed set the
//! processor chains over.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::backends::{RecognitionEngine, VisionClient, VisionRequest};
use crate::classifier::PaperTypeClassifier;
use crate::error::BackendError;
use crate::rules::keywords::clean_key;
use crate::rules::TextRuleEngine;
use crate::types::{
    DraftMarksheet, ExtractionSource, MediaType, SubjectRecord, SubjectResult, ValueSource,
};

pub const VISION_PROMPT: &str = "You are reading a scanned university marksheet. \
Reply with a single JSON object and nothing else, using exactly these keys:\n\
- \"student_name\": the student's full name as printed\n\
- \"register_number\": the register / roll number as printed\n\
- \"subjects\": an array with one object per subject row, each with \
\"subject\" (subject name without the course code), \
\"marks\" (total marks for the subject; write \"internal+external\" when both are printed), \
\"result\" (\"PASS\" or \"FAIL\") and, when the sheet labels it, \
\"paper_type\" (one of \"CORE\", \"ALLIED\", \"PRACTICAL\", \"NON\")\n\
- \"total_marks\": the grand total as printed\n\
- \"result\": the overall result, \"PASS\" or \"FAIL\"\n\
Use an empty string for anything that is not visible. Do not invent values.";

// ===== VISION =====

#[derive(Debug, Default, Deserialize)]
struct VisionReply {
    #[serde(default)]
    student_name: Option<Value>,
    #[serde(default)]
    register_number: Option<Value>,
    #[serde(default)]
    subjects: Vec<VisionSubject>,
    #[serde(default)]
    total_marks: Option<Value>,
    #[serde(default)]
    result: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VisionSubject {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    marks: Option<Value>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    paper_type: Option<String>,
}

/// Marks as the model wrote them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisionMarks {
    Total(u32),
    Components(u32, u32),
}

fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Anything above this is a misread, not a mark
const MAX_PLAUSIBLE_MARKS: u32 = 1000;

fn parse_marks(value: &Value) -> Option<VisionMarks> {
    let marks = match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| *n >= 0.0).map(|n| n.round() as u64))
            .and_then(|n| u32::try_from(n).ok())
            .map(VisionMarks::Total),
        Value::String(text) => match text.split_once('+') {
            Some((internal, external)) => Some(VisionMarks::Components(
                leading_number(internal)?,
                leading_number(external)?,
            )),
            None => leading_number(text).map(VisionMarks::Total),
        },
        _ => None,
    }?;

    let plausible = match marks {
        VisionMarks::Total(total) => total <= MAX_PLAUSIBLE_MARKS,
        VisionMarks::Components(internal, external) => {
            internal <= MAX_PLAUSIBLE_MARKS && external <= MAX_PLAUSIBLE_MARKS
        }
    };
    plausible.then_some(marks)
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Models sometimes wrap the object in a fenced block or add a sentence
fn json_object_slice(reply: &str) -> &str {
    let trimmed = reply.trim();
    let unfenced = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest
                .strip_prefix("json")
                .or_else(|| rest.strip_prefix("JSON"))
                .unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    };

    match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    }
}

/// Map the model's JSON reply onto a draft; explicit paper-type labels win
pub fn parse_vision_reply(
    reply: &str,
    classifier: &PaperTypeClassifier,
) -> Result<DraftMarksheet, BackendError> {
    let parsed: VisionReply = serde_json::from_str(json_object_slice(reply))
        .map_err(|err| BackendError::MalformedResponse(format!("model reply is not the expected JSON: {err}")))?;

    let mut seen_keys = HashSet::new();
    let subjects = parsed
        .subjects
        .iter()
        .filter_map(|subject| {
            let name = subject.subject.as_deref()?.trim();
            if name.is_empty() {
                return None;
            }

            // A subject needs a mark to be kept
            let (marks, internal_marks, external_marks) =
                match subject.marks.as_ref().and_then(parse_marks) {
                    Some(VisionMarks::Components(internal, external)) => {
                        (internal + external, Some(internal), Some(external))
                    }
                    Some(VisionMarks::Total(total)) => (total, None, None),
                    None => {
                        debug!(subject = name, "vision subject without a usable mark dropped");
                        return None;
                    }
                };

            if !seen_keys.insert(clean_key(name)) {
                debug!(subject = name, "duplicate vision subject dropped");
                return None;
            }
            let result = subject.result.as_deref().and_then(SubjectResult::from_token);

            Some(SubjectRecord {
                subject_name: name.to_string(),
                paper_type: classifier.classify_with_label(name, subject.paper_type.as_deref()),
                marks,
                result,
                result_source: result.map(|_| ValueSource::Extracted),
                internal_marks,
                external_marks,
                max_marks: None,
            })
        })
        .collect();

    Ok(DraftMarksheet {
        student_name: parsed.student_name.as_ref().and_then(value_text),
        register_number: parsed.register_number.as_ref().and_then(value_text),
        subjects,
        total_marks: parsed
            .total_marks
            .as_ref()
            .and_then(value_text)
            .and_then(|total| leading_number(&total))
            .map(|total| total.to_string()),
        overall_result: parsed.result.as_deref().and_then(SubjectResult::from_token),
        confidence: None,
        rejected_lines: 0,
        raw_text: reply.to_string(),
    })
}

pub struct VisionExtractor {
    client: Box<dyn VisionClient>,
    nominal_confidence: u8,
}

impl VisionExtractor {
    pub fn new(client: Box<dyn VisionClient>, nominal_confidence: u8) -> Self {
        Self {
            client,
            nominal_confidence,
        }
    }

    pub fn extract(
        &self,
        path: &Path,
        media_type: MediaType,
        classifier: &PaperTypeClassifier,
    ) -> Result<DraftMarksheet, BackendError> {
        if !media_type.is_vision_supported() {
            return Err(BackendError::Unsupported(media_type));
        }

        let image = std::fs::read(path)?;
        let reply = self.client.complete(&VisionRequest {
            prompt: VISION_PROMPT,
            image: &image,
            media_type,
        })?;
        debug!(chars = reply.len(), "vision reply received");

        let mut draft = parse_vision_reply(&reply, classifier)?;
        draft.confidence = Some(self.nominal_confidence);
        Ok(draft)
    }
}

// ===== LOCAL =====

pub struct LocalExtractor {
    engine: Box<dyn RecognitionEngine>,
    rules: TextRuleEngine,
    language: String,
    text_layer_confidence: u8,
}

impl LocalExtractor {
    pub fn new(
        engine: Box<dyn RecognitionEngine>,
        rules: TextRuleEngine,
        language: &str,
        text_layer_confidence: u8,
    ) -> Self {
        Self {
            engine,
            rules,
            language: language.to_string(),
            text_layer_confidence,
        }
    }

    pub fn rules(&self) -> &TextRuleEngine {
        &self.rules
    }

    pub fn extract(
        &self,
        path: &Path,
        media_type: MediaType,
        classifier: &PaperTypeClassifier,
    ) -> Result<DraftMarksheet, BackendError> {
        let recognized = self.engine.recognize(path, media_type, &self.language)?;
        if recognized.text.trim().is_empty() {
            return Err(BackendError::EmptyText);
        }

        // Text-native documents carry no engine confidence
        let confidence = recognized
            .confidence
            .or((media_type == MediaType::Pdf).then_some(self.text_layer_confidence));

        Ok(self
            .rules
            .apply_rules(&recognized.text, confidence, classifier))
    }
}

// ===== STRATEGY =====

/// Extraction strategy, selected by configuration and tried in chain order
pub enum Extractor {
    Vision(VisionExtractor),
    Local(LocalExtractor),
}

impl Extractor {
    pub fn name(&self) -> &str {
        match self {
            Extractor::Vision(extractor) => extractor.client.name(),
            Extractor::Local(extractor) => extractor.engine.name(),
        }
    }

    pub fn source(&self) -> ExtractionSource {
        match self {
            Extractor::Vision(_) => ExtractionSource::Vision,
            Extractor::Local(_) => ExtractionSource::Local,
        }
    }

    pub fn supports(&self, media_type: MediaType) -> bool {
        match self {
            Extractor::Vision(_) => media_type.is_vision_supported(),
            Extractor::Local(_) => true,
        }
    }

    pub fn extract(
        &self,
        path: &Path,
        media_type: MediaType,
        classifier: &PaperTypeClassifier,
    ) -> Result<DraftMarksheet, BackendError> {
        match self {
            Extractor::Vision(extractor) => extractor.extract(path, media_type, classifier),
            Extractor::Local(extractor) => extractor.extract(path, media_type, classifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaperType;

    #[test]
    fn test_vision_reply_field_mapping() {
        let reply = r#"```json
{
  "student_name": "Asha Devi",
  "register_number": "21CS1042",
  "subjects": [
    {"subject": "Mathematics", "marks": 70, "result": "PASS"},
    {"subject": "Physics Practical", "marks": "021+039", "result": "P"},
    {"subject": "Yoga", "marks": "45", "result": "Pass", "paper_type": "NON"},
    {"subject": "", "marks": 10, "result": "PASS"}
  ],
  "total_marks": "175",
  "result": "PASS"
}
```"#;
        let draft = parse_vision_reply(reply, &PaperTypeClassifier::new()).unwrap();
        assert_eq!(draft.student_name.as_deref(), Some("Asha Devi"));
        assert_eq!(draft.register_number.as_deref(), Some("21CS1042"));
        assert_eq!(draft.subjects.len(), 3);
        assert_eq!(draft.subjects[0].marks, 70);
        assert_eq!(draft.subjects[1].marks, 60);
        assert_eq!(draft.subjects[1].internal_marks, Some(21));
        assert_eq!(draft.subjects[1].paper_type, PaperType::Practical);
        assert_eq!(draft.subjects[2].paper_type, PaperType::Non);
        assert_eq!(draft.subjects[2].result_source, Some(ValueSource::Extracted));
        assert_eq!(draft.total_marks.as_deref(), Some("175"));
        assert_eq!(draft.overall_result, Some(SubjectResult::Pass));
    }

    #[test]
    fn test_vision_reply_missing_values_stay_unset() {
        let reply = r#"Here is the data: {"student_name": "", "register_number": null,
            "subjects": [{"subject": "English", "marks": null}], "total_marks": ""}"#;
        let draft = parse_vision_reply(reply, &PaperTypeClassifier::new()).unwrap();
        assert_eq!(draft.student_name, None);
        assert_eq!(draft.register_number, None);
        assert_eq!(draft.total_marks, None);
        assert_eq!(draft.overall_result, None);
        assert!(draft.subjects.is_empty());
    }

    #[test]
    fn test_vision_subject_without_result_stays_unset() {
        let reply = r#"{"subjects": [{"subject": "English", "marks": 70}]}"#;
        let draft = parse_vision_reply(reply, &PaperTypeClassifier::new()).unwrap();
        assert_eq!(draft.subjects[0].marks, 70);
        assert_eq!(draft.subjects[0].result, None);
        assert_eq!(draft.subjects[0].result_source, None);
    }

    #[test]
    fn test_vision_duplicates_and_markless_subjects_dropped() {
        let reply = r#"{"subjects": [
            {"subject": "English", "marks": 70, "result": "PASS"},
            {"subject": "ENGLISH", "marks": 70, "result": "PASS"},
            {"subject": "Maths", "marks": null, "result": "PASS"}
        ]}"#;
        let draft = parse_vision_reply(reply, &PaperTypeClassifier::new()).unwrap();
        let subjects: Vec<_> = draft
            .subjects
            .iter()
            .map(|subject| (subject.subject_name.as_str(), subject.marks))
            .collect();
        assert_eq!(subjects, vec![("English", 70)]);
    }

    #[test]
    fn test_implausible_vision_marks_rejected() {
        assert_eq!(parse_marks(&serde_json::json!(3000000000u64)), None);
        assert_eq!(parse_marks(&serde_json::json!("4000000000+400000000")), None);
        assert_eq!(parse_marks(&serde_json::json!("999+1")), Some(VisionMarks::Components(999, 1)));

        let reply = r#"{"subjects": [
            {"subject": "English", "marks": 3000000000},
            {"subject": "Tamil", "marks": 3000000000}
        ]}"#;
        let draft = parse_vision_reply(reply, &PaperTypeClassifier::new()).unwrap();
        assert!(draft.subjects.is_empty());
    }

    #[test]
    fn test_numeric_register_number() {
        let reply = r#"{"register_number": 2113141051, "subjects": []}"#;
        let draft = parse_vision_reply(reply, &PaperTypeClassifier::new()).unwrap();
        assert_eq!(draft.register_number.as_deref(), Some("2113141051"));
    }

    #[test]
    fn test_non_json_reply_is_malformed() {
        let err = parse_vision_reply("I cannot read this image.", &PaperTypeClassifier::new())
            .unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_marks_variants() {
        assert_eq!(parse_marks(&serde_json::json!(72)), Some(VisionMarks::Total(72)));
        assert_eq!(parse_marks(&serde_json::json!(71.6)), Some(VisionMarks::Total(72)));
        assert_eq!(
            parse_marks(&serde_json::json!("18 + 52")),
            Some(VisionMarks::Components(18, 52))
        );
        assert_eq!(parse_marks(&serde_json::json!("AB")), None);
    }
}

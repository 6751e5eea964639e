use std::cell::RefCell;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use super::fields::FieldRules;
use super::subject_table::SubjectTableExtractor;
use crate::classifier::PaperTypeClassifier;
use crate::config::ExtractionConfig;
use crate::normalizer::{NormalizedText, TextNormalizer};
use crate::types::DraftMarksheet;

/// Runs the text-side stages over recognized text: normalize, resolve the
/// labelled fields, then walk the subject table.
pub struct TextRuleEngine {
    normalizer: TextNormalizer,
    fields: FieldRules,
    subject_table: SubjectTableExtractor,
    pub rule_timings: RefCell<Vec<(String, Duration)>>,
}

impl TextRuleEngine {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        Ok(Self {
            normalizer: TextNormalizer::new(&config.normalizer),
            fields: FieldRules::new()?,
            subject_table: SubjectTableExtractor::new(&config.subject_table)?,
            rule_timings: RefCell::new(Vec::new()),
        })
    }

    pub fn normalize(&self, raw_text: &str) -> NormalizedText {
        self.normalizer.normalize(raw_text)
    }

    /// Build a draft from raw text. Never fails; misses stay unset.
    pub fn apply_rules(
        &self,
        raw_text: &str,
        confidence: Option<u8>,
        classifier: &PaperTypeClassifier,
    ) -> DraftMarksheet {
        let text = self.timed("normalize", || self.normalize(raw_text));
        self.apply_rules_to_normalized(&text, raw_text, confidence, classifier)
    }

    pub fn apply_rules_to_normalized(
        &self,
        text: &NormalizedText,
        raw_text: &str,
        confidence: Option<u8>,
        classifier: &PaperTypeClassifier,
    ) -> DraftMarksheet {
        let fields = self.timed("fields", || self.fields.extract_all(text));
        let table = self.timed("subject_table", || self.subject_table.extract(text, classifier));

        debug!(
            lines = text.lines.len(),
            subjects = table.subjects.len(),
            rejected = table.rejected_lines,
            "text rules applied"
        );

        DraftMarksheet {
            student_name: fields.student_name,
            register_number: fields.register_number,
            subjects: table.subjects,
            total_marks: fields.total_marks,
            overall_result: fields.overall_result,
            confidence,
            rejected_lines: table.rejected_lines,
            raw_text: raw_text.to_string(),
        }
    }

    /// Drain the per-rule timings collected since the last call
    pub fn take_timings(&self) -> Vec<(String, Duration)> {
        self.rule_timings.take()
    }

    fn timed<T>(&self, rule_name: &str, rule: impl FnOnce() -> T) -> T {
        let rule_start = Instant::now();
        let output = rule();
        self.rule_timings
            .borrow_mut()
            .push((rule_name.to_string(), rule_start.elapsed()));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubjectResult;

    #[test]
    fn test_full_document() {
        let engine = TextRuleEngine::new(&ExtractionConfig::default()).unwrap();
        let raw = "BHARATHIAR UNIVERSITY\n\
                   Name of the Candidate : ASHA DEVI\n\
                   Register Number: 21CS1042\n\
                   SUBJECT\tINT\tEXT\tTOTAL\tMAX\tRESULT\n\
                   MATHEMATICS     18   52   70   100   PASS\n\
                   ENGLISH\t20\t55\tPASS\n\
                   TOTAL\n\
                   Result: PASS\n";
        let draft = engine.apply_rules(raw, Some(82), &PaperTypeClassifier::new());

        assert_eq!(draft.student_name.as_deref(), Some("ASHA DEVI"));
        assert_eq!(draft.register_number.as_deref(), Some("21CS1042"));
        assert_eq!(draft.subjects.len(), 2);
        assert_eq!(draft.subjects[0].marks, 70);
        assert_eq!(draft.subjects[1].marks, 75);
        assert_eq!(draft.total_marks, None);
        assert_eq!(draft.overall_result, Some(SubjectResult::Pass));
        assert_eq!(draft.confidence, Some(82));

        let timings = engine.take_timings();
        let names: Vec<_> = timings.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["normalize", "fields", "subject_table"]);
        assert!(engine.take_timings().is_empty());
    }

    #[test]
    fn test_empty_text_is_empty_draft() {
        let engine = TextRuleEngine::new(&ExtractionConfig::default()).unwrap();
        let draft = engine.apply_rules("", None, &PaperTypeClassifier::new());
        assert_eq!(draft.student_name, None);
        assert_eq!(draft.register_number, None);
        assert_eq!(draft.total_marks, None);
        assert_eq!(draft.overall_result, None);
        assert!(draft.subjects.is_empty());
    }
}

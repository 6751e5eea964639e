use anyhow::Result;
use regex::Regex;
use tracing::debug;

use super::keywords::{fold_for_keywords, is_reserved_name, NON_NAME_WORDS};
use crate::normalizer::{NormalizedText, COLUMN_SEPARATOR};
use crate::types::SubjectResult;

/// A single-field extractor over normalized text.
///
/// Misses are `None`, never errors: an unresolved field becomes an empty
/// form field for the reviewer.
pub trait FieldRule {
    fn extract(&self, text: &NormalizedText) -> Option<String>;

    /// Rule name for logging/debugging
    fn name(&self) -> &str;
}

/// Where a pattern is run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternScope {
    /// Against the rejoined full text, so a label may sit on the line above its value
    Document,
    /// Against each line on its own, in reading order
    Line,
}

/// One named pattern with a `value` capture group
pub struct FieldPattern {
    pub name: &'static str,
    regex: Regex,
    scope: PatternScope,
    /// Lines for which this pattern must not be tried (line scope only)
    skip_line: Option<fn(&str) -> bool>,
}

impl FieldPattern {
    pub fn new(name: &'static str, pattern: &str, scope: PatternScope) -> Result<Self> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            scope,
            skip_line: None,
        })
    }

    pub fn skipping(mut self, skip_line: fn(&str) -> bool) -> Self {
        self.skip_line = Some(skip_line);
        self
    }
}

/// Ordered pattern list plus a plausibility filter. Patterns run from most
/// to least specific; the first value that survives the filter wins.
pub struct PatternFieldRule {
    name: &'static str,
    patterns: Vec<FieldPattern>,
    accept: fn(&str) -> Option<String>,
}

impl PatternFieldRule {
    pub fn new(
        name: &'static str,
        patterns: Vec<FieldPattern>,
        accept: fn(&str) -> Option<String>,
    ) -> Self {
        Self {
            name,
            patterns,
            accept,
        }
    }

    fn first_plausible(&self, pattern: &FieldPattern, haystack: &str) -> Option<String> {
        pattern
            .regex
            .captures_iter(haystack)
            .filter_map(|caps| caps.name("value"))
            .find_map(|value| (self.accept)(value.as_str()))
    }
}

impl FieldRule for PatternFieldRule {
    fn extract(&self, text: &NormalizedText) -> Option<String> {
        if text.is_empty() {
            return None;
        }

        for pattern in &self.patterns {
            let found = match pattern.scope {
                PatternScope::Document => self.first_plausible(pattern, &text.full_text),
                PatternScope::Line => text
                    .lines
                    .iter()
                    .filter(|line| !pattern.skip_line.is_some_and(|skip| skip(line)))
                    .find_map(|line| self.first_plausible(pattern, line)),
            };

            if let Some(value) = found {
                debug!(field = self.name, pattern = pattern.name, value = %value, "field matched");
                return Some(value);
            }
        }

        debug!(field = self.name, "field not found");
        None
    }

    fn name(&self) -> &str {
        self.name
    }
}

// ===== PLAUSIBILITY FILTERS =====

/// Words a greedy label match drags in after the actual name
const NAME_STOP_WORDS: &[&str] = &[
    "reg", "register", "registration", "roll", "no", "number", "s/o", "d/o", "dob", "class",
    "sem", "semester", "father", "mother", "gender",
];

pub fn accept_name(raw: &str) -> Option<String> {
    let first_cell = raw.split(COLUMN_SEPARATOR).next().unwrap_or("");

    let mut words = Vec::new();
    for word in first_cell.split_whitespace() {
        let lowered = word.trim_matches(|c: char| c == '.' || c == ':').to_lowercase();
        if NAME_STOP_WORDS.contains(&lowered.as_str()) || word.chars().any(|c| c.is_ascii_digit()) {
            break;
        }
        words.push(word);
    }

    let name = words
        .join(" ")
        .trim_matches(|c: char| c == '.' || c == ',' || c == '-' || c == '\'' || c.is_whitespace())
        .to_string();

    let length = name.chars().count();
    if !(3..=80).contains(&length) {
        return None;
    }
    if name.chars().filter(|c| c.is_alphabetic()).count() < 3 {
        return None;
    }

    let folded = fold_for_keywords(&name);
    if folded
        .split(' ')
        .any(|word| NON_NAME_WORDS.contains(&word))
        || is_reserved_name(&name)
    {
        return None;
    }

    Some(name)
}

pub fn accept_register_number(raw: &str) -> Option<String> {
    let value = raw.trim_matches(|c: char| c == '-' || c == '/').to_uppercase();
    let length = value.chars().count();

    let plausible = (4..=20).contains(&length)
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '/' || c == '-')
        && value.chars().any(|c| c.is_ascii_digit());

    plausible.then_some(value)
}

pub fn accept_total_marks(raw: &str) -> Option<String> {
    let digits = raw.trim();
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().map(|total| total.to_string())
}

pub fn accept_overall_result(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    if lowered.starts_with("all") {
        return Some("PASS".to_string());
    }
    match SubjectResult::from_token(&lowered)? {
        SubjectResult::Pass => Some("PASS".to_string()),
        SubjectResult::Fail => Some("FAIL".to_string()),
    }
}

/// A line carrying marks columns or a pass/fail token is a table row
fn looks_like_table_row(line: &str) -> bool {
    let folded = fold_for_keywords(line);
    let has_result_token = folded
        .split(' ')
        .any(|word| matches!(word, "pass" | "fail" | "passed" | "failed" | "p" | "f"));
    let mark_columns = line
        .split_whitespace()
        .filter(|word| word.len() <= 3 && word.chars().all(|c| c.is_ascii_digit()))
        .count();
    has_result_token || mark_columns >= 2
}

// ===== RULE CONSTRUCTORS =====

pub fn name_rule() -> Result<PatternFieldRule> {
    let patterns = vec![
        FieldPattern::new(
            "student_name_label",
            r"(?i)\b(?:name\s+of\s+(?:the\s+)?(?:student|candidate)|(?:student|candidate)(?:'s)?\s*name)\s*[:\-–]\s*(?P<value>[A-Za-z][A-Za-z .']{1,100})",
            PatternScope::Document,
        )?,
        FieldPattern::new(
            "name_label",
            r"(?im)^\s*name\s*[:\-–]\s*(?P<value>[A-Za-z][A-Za-z .']{1,100})",
            PatternScope::Document,
        )?,
        FieldPattern::new(
            "name_label_without_delimiter",
            r"(?im)^\s*(?:student\s+name|name\s+of\s+(?:the\s+)?(?:student|candidate)|name)\s+(?P<value>[A-Za-z][A-Za-z .']{1,100})$",
            PatternScope::Line,
        )?,
        FieldPattern::new(
            "capitalized_words",
            r"^(?P<value>[A-Z][A-Za-z.']*(?: [A-Z][A-Za-z.']*){0,4})$",
            PatternScope::Line,
        )?,
    ];
    Ok(PatternFieldRule::new("student_name", patterns, accept_name))
}

pub fn register_number_rule() -> Result<PatternFieldRule> {
    let patterns = vec![
        FieldPattern::new(
            "register_label",
            r"(?i)\b(?:register|registration|reg|roll|enrol?l?ment|seat|hall\s*ticket)\.?\s*(?:number|num|no)?\.?\s*[:\-–#]?\s*(?P<value>[A-Za-z0-9][A-Za-z0-9/\-]{3,30})",
            PatternScope::Document,
        )?,
        FieldPattern::new(
            "register_shape",
            r"\b(?P<value>\d{2}[A-Za-z]{2,5}\d{3,6}|[A-Za-z]{2,5}\d{6,12}|\d{8,13})\b",
            PatternScope::Line,
        )?
        .skipping(looks_like_table_row),
    ];
    Ok(PatternFieldRule::new(
        "register_number",
        patterns,
        accept_register_number,
    ))
}

pub fn total_marks_rule() -> Result<PatternFieldRule> {
    let patterns = vec![
        FieldPattern::new(
            "total_label",
            r"(?i)\b(?:grand\s+total|total\s+marks(?:\s+obtained)?|marks\s+obtained|aggregate(?:\s+marks)?|total)[ \t]*[:\-–=]?[ \t]*(?P<value>\d{1,4})\b",
            PatternScope::Document,
        )?,
        // Label alone on its line, value alone on the next
        FieldPattern::new(
            "total_label_above_value",
            r"(?im)^(?:grand\s+total|total\s+marks(?:\s+obtained)?|marks\s+obtained|aggregate(?:\s+marks)?|total)[ \t]*[:\-–=]?[ \t]*\n(?P<value>\d{2,4})[ \t]*$",
            PatternScope::Document,
        )?,
        FieldPattern::new(
            "total_label_loose",
            r"(?i)\b(?:total|aggregate)\b[^\n\d]{0,30}(?P<value>\d{2,4})\b",
            PatternScope::Document,
        )?,
    ];
    Ok(PatternFieldRule::new("total_marks", patterns, accept_total_marks))
}

pub fn overall_result_rule() -> Result<PatternFieldRule> {
    let patterns = vec![
        FieldPattern::new(
            "result_label",
            r"(?i)\b(?:overall\s+result|final\s+result|result|status)\s*[:\-–]\s*(?P<value>pass(?:ed)?|fail(?:ed)?|p|f)\b",
            PatternScope::Document,
        )?,
        FieldPattern::new(
            "result_label_without_delimiter",
            r"(?i)\b(?:overall\s+result|final\s+result|result)\s+(?P<value>pass(?:ed)?|fail(?:ed)?)\b",
            PatternScope::Document,
        )?,
        FieldPattern::new(
            "passed_in_all",
            r"(?i)\b(?P<value>passed\s+in\s+all|all\s+clear)\b",
            PatternScope::Line,
        )?,
    ];
    Ok(PatternFieldRule::new(
        "overall_result",
        patterns,
        accept_overall_result,
    ))
}

/// Fields resolved from one document; any may be unset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub student_name: Option<String>,
    pub register_number: Option<String>,
    pub total_marks: Option<String>,
    pub overall_result: Option<SubjectResult>,
}

/// The four field extractors, each run independently
pub struct FieldRules {
    name: PatternFieldRule,
    register_number: PatternFieldRule,
    total_marks: PatternFieldRule,
    overall_result: PatternFieldRule,
}

impl FieldRules {
    pub fn new() -> Result<Self> {
        Ok(Self {
            name: name_rule()?,
            register_number: register_number_rule()?,
            total_marks: total_marks_rule()?,
            overall_result: overall_result_rule()?,
        })
    }

    pub fn extract_all(&self, text: &NormalizedText) -> ExtractedFields {
        ExtractedFields {
            student_name: self.name.extract(text),
            register_number: self.register_number.extract(text),
            total_marks: self.total_marks.extract(text),
            overall_result: self
                .overall_result
                .extract(text)
                .and_then(|value| SubjectResult::from_token(&value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::TextNormalizer;

    fn normalized(raw: &str) -> NormalizedText {
        TextNormalizer::default().normalize(raw)
    }

    #[test]
    fn test_register_number_label() {
        let rule = register_number_rule().unwrap();
        let text = normalized("Register Number: 21CS1042");
        assert_eq!(rule.extract(&text).as_deref(), Some("21CS1042"));

        let text = normalized("Reg. No. :  BCA/21/007\nName: Priya");
        assert_eq!(rule.extract(&text).as_deref(), Some("BCA/21/007"));
    }

    #[test]
    fn test_register_number_on_next_line() {
        let rule = register_number_rule().unwrap();
        let text = normalized("REGISTER NO\n2113141051");
        assert_eq!(rule.extract(&text).as_deref(), Some("2113141051"));
    }

    #[test]
    fn test_register_number_shape_skips_subject_rows() {
        let rule = register_number_rule().unwrap();
        let text = normalized("23UEN101  ENGLISH  20  55  PASS\nASHA DEVI  22BCA117");
        assert_eq!(rule.extract(&text).as_deref(), Some("22BCA117"));
    }

    #[test]
    fn test_register_number_rejects_words() {
        assert_eq!(accept_register_number("Number"), None);
        assert_eq!(accept_register_number("12"), None);
        assert_eq!(accept_register_number("21cs1042"), Some("21CS1042".to_string()));
    }

    #[test]
    fn test_name_label_trims_suffix() {
        let rule = name_rule().unwrap();
        let text = normalized("Student Name: ASHA DEVI Reg No 21CS1042");
        assert_eq!(rule.extract(&text).as_deref(), Some("ASHA DEVI"));

        let text = normalized("Name :  Rahul K.  Semester: IV");
        assert_eq!(rule.extract(&text).as_deref(), Some("Rahul K"));
    }

    #[test]
    fn test_name_ignores_other_labels() {
        let rule = name_rule().unwrap();
        let text = normalized("Subject Name: Mathematics\nName of the Candidate : MEERA NAIR");
        assert_eq!(rule.extract(&text).as_deref(), Some("MEERA NAIR"));
    }

    #[test]
    fn test_name_shape_fallback() {
        let rule = name_rule().unwrap();
        let text = normalized(
            "BHARATHIAR UNIVERSITY\nSTATEMENT OF MARKS\nKAVYA SRINIVASAN\nENGLISH  20  55  PASS",
        );
        assert_eq!(rule.extract(&text).as_deref(), Some("KAVYA SRINIVASAN"));
    }

    #[test]
    fn test_total_marks() {
        let rule = total_marks_rule().unwrap();
        assert_eq!(
            rule.extract(&normalized("GRAND TOTAL : 0452")).as_deref(),
            Some("452")
        );
        assert_eq!(
            rule.extract(&normalized("Total marks secured (in figures)  388")).as_deref(),
            Some("388")
        );
        assert_eq!(rule.extract(&normalized("Total Credits")), None);
    }

    #[test]
    fn test_total_label_does_not_read_next_row_serial() {
        let rule = total_marks_rule().unwrap();
        let text = normalized(
            "S.NO  SUBJECT  INT  EXT  TOTAL\n1  ENGLISH  20  55  75  PASS\n2  TAMIL  20  50  70  PASS",
        );
        assert_eq!(rule.extract(&text), None);
    }

    #[test]
    fn test_total_value_on_line_below_label() {
        let rule = total_marks_rule().unwrap();
        let text = normalized("GRAND TOTAL\n452\nRESULT: PASS");
        assert_eq!(rule.extract(&text).as_deref(), Some("452"));
    }

    #[test]
    fn test_overall_result() {
        let rules = FieldRules::new().unwrap();
        let fields = rules.extract_all(&normalized("RESULT: PASS"));
        assert_eq!(fields.overall_result, Some(SubjectResult::Pass));

        let fields = rules.extract_all(&normalized("Final Result  FAILED"));
        assert_eq!(fields.overall_result, Some(SubjectResult::Fail));

        let fields = rules.extract_all(&normalized("Candidate has PASSED IN ALL subjects"));
        assert_eq!(fields.overall_result, Some(SubjectResult::Pass));
    }

    #[test]
    fn test_empty_text_leaves_everything_unset() {
        let rules = FieldRules::new().unwrap();
        assert_eq!(rules.extract_all(&normalized("")), ExtractedFields::default());
    }
}

//! Subject Table Extractor
//!
//! Each normalized line yields zero or one subject. Line shapes are an ordered
//! list of named [`LinePattern`]s; the first pattern that returns a match owns
//! the line and no later pattern sees it.

use std::collections::HashSet;

use anyhow::Result;
use regex::{Captures, Regex};
use tracing::debug;

use super::keywords::{clean_key, is_header_line, is_reserved_name};
use crate::classifier::PaperTypeClassifier;
use crate::config::SubjectTableConfig;
use crate::normalizer::{NormalizedText, COLUMN_SEPARATOR};
use crate::types::{SubjectRecord, SubjectResult, ValueSource};

// Pattern fragments. Names never contain digits, which keeps the numeric
// columns unambiguous.
const SERIAL: &str = r"^(?:\d{1,2}[.)]?\s+)?";
const NAME: &str = r"(?P<name>[A-Za-z][A-Za-z&.,()/'\- ]*?)";
const CODE: &str = r"^(?P<code>\d{0,2}[A-Z]{2,6}[-/]?\d{2,4}[A-Z]?)";
const NUMS: &str = r"\s+(?P<nums>\d{1,3}(?:\s*\+\s*\d{1,3}|(?:\s+\d{1,3}){0,3}))";
const RESULT: &str = r"\s+(?P<result>[PpFf][A-Za-z]*)\s*$";

/// Marks read off one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkColumns {
    pub marks: u32,
    pub internal: Option<u32>,
    pub external: Option<u32>,
    pub max: Option<u32>,
    pub result: Option<SubjectResult>,
}

impl MarkColumns {
    fn split(internal: u32, external: u32, max: Option<u32>, result: Option<SubjectResult>) -> Self {
        Self {
            marks: internal + external,
            internal: Some(internal),
            external: Some(external),
            max,
            result,
        }
    }

    fn total(marks: u32, max: Option<u32>, result: Option<SubjectResult>) -> Self {
        Self {
            marks,
            internal: None,
            external: None,
            max,
            result,
        }
    }
}

/// How the subject is named on the line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectLabel {
    Named(String),
    /// Only a course code; the name may sit on a preceding line
    BareCode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub label: SubjectLabel,
    pub columns: MarkColumns,
}

type Interpreter = fn(&Captures, &SubjectTableConfig) -> Option<LineMatch>;

/// One column layout
pub struct LinePattern {
    pub name: &'static str,
    regex: Regex,
    interpret: Interpreter,
}

impl LinePattern {
    fn new(name: &'static str, parts: &[&str], interpret: Interpreter) -> Result<Self> {
        Ok(Self {
            name,
            regex: Regex::new(&parts.concat())?,
            interpret,
        })
    }

    pub fn try_match(&self, line: &str, config: &SubjectTableConfig) -> Option<LineMatch> {
        let caps = self.regex.captures(line)?;
        (self.interpret)(&caps, config)
    }
}

fn number(caps: &Captures, group: &str) -> Option<u32> {
    caps.name(group)?.as_str().parse().ok()
}

fn result_token(caps: &Captures) -> Option<SubjectResult> {
    caps.name("result")
        .and_then(|token| SubjectResult::from_token(token.as_str()))
}

fn named(caps: &Captures) -> Option<SubjectLabel> {
    let name = clean_subject_name(caps.name("name")?.as_str());
    Some(SubjectLabel::Named(name))
}

fn plausible_split(internal: u32, external: u32, config: &SubjectTableConfig) -> bool {
    internal <= config.max_internal_marks && external <= config.max_external_marks
}

/// Single spaces between words, no trailing separators
pub fn clean_subject_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c: char| matches!(c, '-' | ',' | '/' | ':' | '.') || c.is_whitespace())
        .to_string()
}

/// Numeric run after a code: marks / int ext / int ext total / int ext total max,
/// or an `int+ext` expression
fn interpret_numeric_columns(
    nums: &str,
    result: Option<SubjectResult>,
    config: &SubjectTableConfig,
) -> Option<MarkColumns> {
    if let Some((internal, external)) = nums.split_once('+') {
        return Some(MarkColumns::split(
            internal.trim().parse().ok()?,
            external.trim().parse().ok()?,
            None,
            result,
        ));
    }

    let values: Vec<u32> = nums
        .split_whitespace()
        .map(|value| value.parse().ok())
        .collect::<Option<_>>()?;

    match values.as_slice() {
        [marks] => Some(MarkColumns::total(*marks, None, result)),
        [first, second] if plausible_split(*first, *second, config) => {
            Some(MarkColumns::split(*first, *second, None, result))
        }
        [total, max] if total <= max => Some(MarkColumns::total(*total, Some(*max), result)),
        [internal, external, _total] => Some(MarkColumns::split(*internal, *external, None, result)),
        [internal, external, _total, max] => {
            Some(MarkColumns::split(*internal, *external, Some(*max), result))
        }
        _ => None,
    }
}

// ===== INTERPRETERS =====

fn six_column(caps: &Captures, _config: &SubjectTableConfig) -> Option<LineMatch> {
    let columns = MarkColumns::split(
        number(caps, "int")?,
        number(caps, "ext")?,
        number(caps, "max"),
        result_token(caps),
    );
    Some(LineMatch { label: named(caps)?, columns })
}

/// Internal and external components; a running total column is ignored
fn components(caps: &Captures, _config: &SubjectTableConfig) -> Option<LineMatch> {
    let columns = MarkColumns::split(
        number(caps, "int")?,
        number(caps, "ext")?,
        None,
        result_token(caps),
    );
    Some(LineMatch { label: named(caps)?, columns })
}

fn four_column(caps: &Captures, config: &SubjectTableConfig) -> Option<LineMatch> {
    let internal = number(caps, "int")?;
    let external = number(caps, "ext")?;
    if !plausible_split(internal, external, config) {
        return None;
    }
    let columns = MarkColumns::split(internal, external, None, result_token(caps));
    Some(LineMatch { label: named(caps)?, columns })
}

fn total_max(caps: &Captures, _config: &SubjectTableConfig) -> Option<LineMatch> {
    let total = number(caps, "total")?;
    let max = number(caps, "max")?;
    if max == 0 || total > max {
        return None;
    }
    let columns = MarkColumns::total(total, Some(max), result_token(caps));
    Some(LineMatch { label: named(caps)?, columns })
}

fn single_mark(caps: &Captures, _config: &SubjectTableConfig) -> Option<LineMatch> {
    let columns = MarkColumns::total(number(caps, "marks")?, None, result_token(caps));
    Some(LineMatch { label: named(caps)?, columns })
}

fn bare_pair(caps: &Captures, config: &SubjectTableConfig) -> Option<LineMatch> {
    let internal = number(caps, "int")?;
    let external = number(caps, "ext")?;
    if !plausible_split(internal, external, config) {
        return None;
    }
    let columns = MarkColumns::split(internal, external, None, None);
    Some(LineMatch { label: named(caps)?, columns })
}

fn code_prefixed(caps: &Captures, config: &SubjectTableConfig) -> Option<LineMatch> {
    let columns = interpret_numeric_columns(caps.name("nums")?.as_str(), result_token(caps), config)?;
    Some(LineMatch { label: named(caps)?, columns })
}

fn bare_code(caps: &Captures, config: &SubjectTableConfig) -> Option<LineMatch> {
    let columns = interpret_numeric_columns(caps.name("nums")?.as_str(), result_token(caps), config)?;
    let code = caps.name("code")?.as_str().to_string();
    Some(LineMatch {
        label: SubjectLabel::BareCode(code),
        columns,
    })
}

/// Line patterns in priority order, most specific first
pub fn default_line_patterns() -> Result<Vec<LinePattern>> {
    Ok(vec![
        LinePattern::new(
            "six_column",
            &[
                SERIAL,
                NAME,
                r"\s+(?P<int>\d{1,3})\s+(?P<ext>\d{1,3})\s+(?P<total>\d{1,3})\s+(?P<max>\d{2,3})",
                RESULT,
            ],
            six_column,
        )?,
        LinePattern::new(
            "five_column",
            &[
                SERIAL,
                NAME,
                r"\s+(?P<int>\d{1,3})\s+(?P<ext>\d{1,3})\s+(?P<total>\d{1,3})",
                RESULT,
            ],
            components,
        )?,
        LinePattern::new(
            "four_column",
            &[SERIAL, NAME, r"\s+(?P<int>\d{1,3})\s+(?P<ext>\d{1,3})", RESULT],
            four_column,
        )?,
        LinePattern::new(
            "total_max",
            &[SERIAL, NAME, r"\s+(?P<total>\d{1,3})\s*/?\s+(?P<max>\d{2,3})", RESULT],
            total_max,
        )?,
        LinePattern::new(
            "expression",
            &[
                SERIAL,
                NAME,
                r"\s+(?P<int>\d{1,3})\s*\+\s*(?P<ext>\d{1,3})(?:\s*=\s*(?P<total>\d{1,3}))?",
                RESULT,
            ],
            components,
        )?,
        LinePattern::new(
            "single_mark",
            &[SERIAL, NAME, r"\s+(?P<marks>\d{1,3})", RESULT],
            single_mark,
        )?,
        LinePattern::new(
            "bare_pair",
            &[SERIAL, NAME, r"\s+(?P<int>\d{1,3})\s+(?P<ext>\d{1,3})\s*$"],
            bare_pair,
        )?,
        LinePattern::new(
            "code_prefixed",
            &[CODE, r"\s+", NAME, NUMS, RESULT],
            code_prefixed,
        )?,
        LinePattern::new("bare_code", &[CODE, NUMS, RESULT], bare_code)?,
    ])
}

/// Subjects accepted from one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectTable {
    pub subjects: Vec<SubjectRecord>,
    /// Digit-bearing lines that no pattern accepted, or whose match was filtered out
    pub rejected_lines: usize,
}

pub struct SubjectTableExtractor {
    patterns: Vec<LinePattern>,
    config: SubjectTableConfig,
    multi_digit: Regex,
}

impl SubjectTableExtractor {
    pub fn new(config: &SubjectTableConfig) -> Result<Self> {
        Ok(Self {
            patterns: default_line_patterns()?,
            config: config.clone(),
            multi_digit: Regex::new(r"\d{2,}")?,
        })
    }

    pub fn pattern_names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|pattern| pattern.name).collect()
    }

    /// First pattern that matches wins
    pub fn match_line(&self, line: &str) -> Option<(&'static str, LineMatch)> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .try_match(line, &self.config)
                .map(|line_match| (pattern.name, line_match))
        })
    }

    pub fn extract(&self, text: &NormalizedText, classifier: &PaperTypeClassifier) -> SubjectTable {
        let mut table = SubjectTable::default();
        let mut seen_keys = HashSet::new();

        for (index, line) in text.lines.iter().enumerate() {
            if is_header_line(line, &self.config.extra_header_keywords) {
                continue;
            }

            let Some((pattern, line_match)) = self.match_line(line) else {
                if line.chars().any(|c| c.is_ascii_digit()) {
                    debug!(line = %line, "no subject pattern matched");
                    table.rejected_lines += 1;
                }
                continue;
            };

            let name = match line_match.label {
                SubjectLabel::Named(name) => name,
                SubjectLabel::BareCode(code) => {
                    self.name_from_preceding_lines(&text.lines, index).unwrap_or(code)
                }
            };

            let key = clean_key(&name);
            if key.chars().count() < 3 || is_reserved_name(&name) || !seen_keys.insert(key) {
                debug!(line = %line, subject = %name, pattern, "subject candidate rejected");
                table.rejected_lines += 1;
                continue;
            }

            debug!(subject = %name, marks = line_match.columns.marks, pattern, "subject matched");
            table
                .subjects
                .push(self.to_record(name, line_match.columns, classifier));
        }

        table
    }

    /// Nearest preceding line that reads like a bare subject name
    fn name_from_preceding_lines(&self, lines: &[String], index: usize) -> Option<String> {
        let start = index.saturating_sub(self.config.lookback_lines);
        lines[start..index]
            .iter()
            .rev()
            .find(|line| self.looks_like_subject_name(line))
            .map(|line| clean_subject_name(line.split(COLUMN_SEPARATOR).next().unwrap_or(line.as_str())))
    }

    fn looks_like_subject_name(&self, line: &str) -> bool {
        line.chars().next().is_some_and(|c| c.is_alphabetic())
            && !line.contains(':')
            && !self.multi_digit.is_match(line)
            && !is_header_line(line, &self.config.extra_header_keywords)
    }

    fn to_record(
        &self,
        subject_name: String,
        columns: MarkColumns,
        classifier: &PaperTypeClassifier,
    ) -> SubjectRecord {
        let (result, result_source) = match columns.result {
            Some(result) => (result, ValueSource::Extracted),
            None => {
                let max = columns.max.unwrap_or(self.config.assumed_max_marks);
                let result = if columns.marks as f32 >= self.config.pass_mark(max) {
                    SubjectResult::Pass
                } else {
                    SubjectResult::Fail
                };
                (result, ValueSource::Computed)
            }
        };

        SubjectRecord {
            paper_type: classifier.classify(&subject_name),
            subject_name,
            marks: columns.marks,
            result: Some(result),
            result_source: Some(result_source),
            internal_marks: columns.internal,
            external_marks: columns.external,
            max_marks: columns.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::TextNormalizer;
    use crate::types::PaperType;

    fn extract(raw: &str) -> SubjectTable {
        let extractor = SubjectTableExtractor::new(&SubjectTableConfig::default()).unwrap();
        let text = TextNormalizer::default().normalize(raw);
        extractor.extract(&text, &PaperTypeClassifier::new())
    }

    #[test]
    fn test_six_column_line() {
        let table = extract("MATHEMATICS  18  52  70  100  PASS");
        assert_eq!(table.subjects.len(), 1);
        let subject = &table.subjects[0];
        assert_eq!(subject.subject_name, "MATHEMATICS");
        assert_eq!(subject.marks, 70);
        assert_eq!(subject.result, Some(SubjectResult::Pass));
        assert_eq!(subject.result_source, Some(ValueSource::Extracted));
        assert_eq!(subject.internal_marks, Some(18));
        assert_eq!(subject.external_marks, Some(52));
        assert_eq!(subject.max_marks, Some(100));
    }

    #[test]
    fn test_four_column_line() {
        let table = extract("ENGLISH  20  55  PASS");
        assert_eq!(table.subjects.len(), 1);
        assert_eq!(table.subjects[0].subject_name, "ENGLISH");
        assert_eq!(table.subjects[0].marks, 75);
        assert_eq!(table.subjects[0].result, Some(SubjectResult::Pass));
    }

    #[test]
    fn test_four_column_out_of_range_reads_as_total_and_max() {
        let table = extract("ENGLISH  75  100  PASS");
        let subject = &table.subjects[0];
        assert_eq!(subject.marks, 75);
        assert_eq!(subject.max_marks, Some(100));
        assert_eq!(subject.internal_marks, None);
    }

    #[test]
    fn test_five_column_with_serial_number() {
        let table = extract("3.  Physics Practical  18  52  70  P");
        assert_eq!(table.subjects[0].subject_name, "Physics Practical");
        assert_eq!(table.subjects[0].marks, 70);
        assert_eq!(table.subjects[0].paper_type, PaperType::Practical);
    }

    #[test]
    fn test_expression_line() {
        let table = extract("TAMIL  021+039  PASS");
        let subject = &table.subjects[0];
        assert_eq!(subject.marks, 60);
        assert_eq!(subject.internal_marks, Some(21));
        assert_eq!(subject.external_marks, Some(39));
    }

    #[test]
    fn test_single_mark_fail() {
        let table = extract("Allied Chemistry  28  FAIL");
        let subject = &table.subjects[0];
        assert_eq!(subject.marks, 28);
        assert_eq!(subject.result, Some(SubjectResult::Fail));
        assert_eq!(subject.paper_type, PaperType::Allied);
    }

    #[test]
    fn test_bare_pair_computes_result() {
        let table = extract("CHEMISTRY  20  45\nBOTANY  10  20");
        assert_eq!(table.subjects.len(), 2);
        assert_eq!(table.subjects[0].result, Some(SubjectResult::Pass));
        assert_eq!(table.subjects[0].result_source, Some(ValueSource::Computed));
        assert_eq!(table.subjects[1].marks, 30);
        assert_eq!(table.subjects[1].result, Some(SubjectResult::Fail));
        assert_eq!(table.subjects[1].result_source, Some(ValueSource::Computed));
    }

    #[test]
    fn test_code_prefixed_line() {
        let table = extract("23UEN101  ENGLISH  20  55  PASS");
        assert_eq!(table.subjects[0].subject_name, "ENGLISH");
        assert_eq!(table.subjects[0].marks, 75);
    }

    #[test]
    fn test_bare_code_borrows_preceding_name() {
        let table = extract("ENVIRONMENTAL STUDIES\n23UES101  18  50  68  PASS");
        assert_eq!(table.subjects.len(), 1);
        assert_eq!(table.subjects[0].subject_name, "ENVIRONMENTAL STUDIES");
        assert_eq!(table.subjects[0].marks, 68);
    }

    #[test]
    fn test_bare_code_without_name_keeps_code() {
        let table = extract("Name: Asha Devi\n23UCS205  70  P");
        assert_eq!(table.subjects.len(), 1);
        assert_eq!(table.subjects[0].subject_name, "23UCS205");
    }

    #[test]
    fn test_header_lines_never_become_subjects() {
        let table = extract("TOTAL\nTOTAL  450  600  PASS\nSEMESTER  III  2023");
        assert!(table.subjects.is_empty());
    }

    #[test]
    fn test_subjects_named_like_header_words_kept() {
        let table = extract("TOTAL QUALITY MANAGEMENT  20  55  PASS\nPLACEMENT TRAINING  18  50  PASS\nTOTAL  143");
        let names: Vec<_> = table.subjects.iter().map(|s| s.subject_name.as_str()).collect();
        assert_eq!(names, vec!["TOTAL QUALITY MANAGEMENT", "PLACEMENT TRAINING"]);
        assert_eq!(table.rejected_lines, 0);
    }

    #[test]
    fn test_case_insensitive_dedupe() {
        let table = extract("English  20  55  PASS\nENGLISH  21  50  PASS");
        assert_eq!(table.subjects.len(), 1);
        assert_eq!(table.subjects[0].marks, 75);
        assert_eq!(table.rejected_lines, 1);
    }

    #[test]
    fn test_reserved_and_short_names_rejected() {
        let table = extract("PASS  40  PASS\nGE  20  55  PASS\nHISTORY  20  ABC");
        assert!(table.subjects.is_empty());
        assert_eq!(table.rejected_lines, 3);
    }

    #[test]
    fn test_empty_text() {
        let table = extract("");
        assert!(table.subjects.is_empty());
        assert_eq!(table.rejected_lines, 0);
    }
}

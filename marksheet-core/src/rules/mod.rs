// Text rules - run over recognized text when no structured output is available
// - fields.rs: labelled single-value fields (name, register number, total, result)
// - subject_table.rs: ordered line patterns for the marks table
// - keywords.rs: header/footer vocabulary and reserved words
// - engine.rs: TextRuleEngine tying the above together

pub mod engine;
pub mod fields;
pub mod keywords;
pub mod subject_table;

pub use engine::TextRuleEngine;
pub use fields::{FieldRule, FieldRules};
pub use subject_table::{SubjectTable, SubjectTableExtractor};

//! Text Normalizer
//!
//! Turns raw recognized text into a line-oriented corpus. Runs of tabs or two
//! or more spaces collapse to a canonical two-space separator, which later
//! stages read as a column boundary; single spaces inside a cell are kept.

use crate::config::NormalizerConfig;
use serde::{Deserialize, Serialize};

/// Canonical column separator
pub const COLUMN_SEPARATOR: &str = "  ";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedText {
    /// Cleaned lines in reading order
    pub lines: Vec<String>,
    /// Lines rejoined with `\n` for whole-document matching
    pub full_text: String,
}

impl NormalizedText {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

pub struct TextNormalizer {
    min_line_chars: usize,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(&NormalizerConfig::default())
    }
}

impl TextNormalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self {
            min_line_chars: config.min_line_chars,
        }
    }

    pub fn normalize(&self, raw: &str) -> NormalizedText {
        let lines: Vec<String> = raw
            .lines()
            .map(normalize_line)
            .filter(|line| line.chars().count() >= self.min_line_chars)
            .collect();

        let full_text = lines.join("\n");
        NormalizedText { lines, full_text }
    }
}

/// Collapse whitespace runs and trim a single line
pub fn normalize_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pending_spaces = 0usize;
    let mut pending_tab = false;

    for character in line.chars() {
        match character {
            '\t' => pending_tab = true,
            // NBSP and other unicode blanks come out of OCR regularly
            c if c.is_whitespace() => pending_spaces += 1,
            '\u{0000}' => {}
            c => {
                if !out.is_empty() {
                    if pending_tab || pending_spaces >= 2 {
                        out.push_str(COLUMN_SEPARATOR);
                    } else if pending_spaces == 1 {
                        out.push(' ');
                    }
                }
                pending_spaces = 0;
                pending_tab = false;
                out.push(c);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_lines() {
        let normalized = TextNormalizer::default().normalize("");
        assert!(normalized.is_empty());
        assert!(normalized.full_text.is_empty());
    }

    #[test]
    fn test_tabs_and_space_runs_become_column_separator() {
        assert_eq!(
            normalize_line("  MATHEMATICS\t18     52 \t 70  "),
            "MATHEMATICS  18  52  70"
        );
        assert_eq!(normalize_line("Computer Science 20"), "Computer Science 20");
    }

    #[test]
    fn test_short_noise_lines_are_dropped() {
        let raw = "Name: Asha Devi\r\n|\n  .. \n\nENGLISH  20  55  PASS\n";
        let normalized = TextNormalizer::default().normalize(raw);
        assert_eq!(
            normalized.lines,
            vec!["Name: Asha Devi".to_string(), "ENGLISH  20  55  PASS".to_string()]
        );
        assert_eq!(normalized.full_text, "Name: Asha Devi\nENGLISH  20  55  PASS");
    }
}

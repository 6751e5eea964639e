use crate::types::PaperType;
use tracing::debug;

/// Keyword heuristic assigning a paper type to a subject name.
///
/// Only used when the source layout carried no explicit label; an explicit
/// label (vision path) is authoritative and bypasses this entirely.
pub struct PaperTypeClassifier {
    practical_terms: Vec<String>,
    allied_terms: Vec<String>,
}

impl Default for PaperTypeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperTypeClassifier {
    pub fn new() -> Self {
        Self {
            practical_terms: ["practical", "lab", "project", "viva", "workshop"]
                .iter()
                .map(|term| term.to_string())
                .collect(),
            allied_terms: ["allied", "elective", "open course", "generic"]
                .iter()
                .map(|term| term.to_string())
                .collect(),
        }
    }

    pub fn classify(&self, subject_name: &str) -> PaperType {
        let name = subject_name.to_lowercase();

        let paper_type = if self.contains_any(&name, &self.practical_terms) {
            PaperType::Practical
        } else if self.contains_any(&name, &self.allied_terms) {
            PaperType::Allied
        } else {
            PaperType::Core
        };

        debug!(subject = subject_name, ?paper_type, "classified paper type");
        paper_type
    }

    /// Explicit label wins when it parses; otherwise fall back to keywords
    pub fn classify_with_label(&self, subject_name: &str, label: Option<&str>) -> PaperType {
        label
            .and_then(PaperType::from_label)
            .unwrap_or_else(|| self.classify(subject_name))
    }

    fn contains_any(&self, name: &str, terms: &[String]) -> bool {
        terms.iter().any(|term| name.contains(term.as_str()))
    }
}

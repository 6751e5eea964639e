// Fixed vocabularies shared by the field rules and the subject table.

use crate::normalizer::COLUMN_SEPARATOR;

/// A line starting with one of these is a header/footer, never a subject row
pub const HEADER_PREFIXES: &[&str] = &[
    "semester",
    "sem",
    "total",
    "grand total",
    "signature",
    "controller of",
    "principal",
    "register",
    "reg no",
    "registration",
    "roll no",
    "name of",
    "student name",
    "candidate",
    "subject code",
    "subject name",
    "subject title",
    "course code",
    "course title",
    "paper code",
    "marks obtained",
    "maximum marks",
    "result",
    "overall result",
    "date of",
    "place",
    "page",
    "university",
    "college",
    "statement of marks",
    "mark sheet",
    "marksheet",
    "grade sheet",
    "examination",
    "class obtained",
    "percentage",
    "aggregate",
    "cgpa",
    "sgpa",
    "note",
    "abbreviation",
];

/// Prefixes that also open real subject names ("Total Quality Management",
/// "Placement Training"). They mark a header only when the first cell of the
/// line is made of label words alone.
pub const LABEL_PREFIXES: &[&str] = &["total", "place", "result", "note", "aggregate", "percentage"];

/// Words allowed in the first cell of a label line
const LABEL_WORDS: &[&str] = &[
    "total", "grand", "marks", "mark", "obtained", "secured", "result", "overall", "final",
    "place", "note", "aggregate", "percentage", "of", "in", "maximum", "max",
];

/// Column headers that are only skipped when they make up the whole line
pub const BARE_HEADERS: &[&str] = &[
    "practical",
    "theory",
    "internal",
    "external",
    "subject",
    "subjects",
    "code",
    "max",
    "min",
    "marks",
    "sl no",
    "s no",
    "sno",
    "part i",
    "part ii",
    "part iii",
    "part iv",
];

/// Names a subject row may never resolve to
pub const RESERVED_NAMES: &[&str] = &[
    "pass",
    "fail",
    "passed",
    "failed",
    "total",
    "grandtotal",
    "result",
    "marks",
    "max",
    "min",
    "internal",
    "external",
    "absent",
    "withheld",
    "grade",
    "credit",
    "credits",
];

/// Institution words that rule a line out as a personal name
pub const NON_NAME_WORDS: &[&str] = &[
    "university",
    "college",
    "institute",
    "school",
    "department",
    "semester",
    "examination",
    "examinations",
    "statement",
    "marks",
    "marksheet",
    "mark",
    "sheet",
    "result",
    "results",
    "grade",
    "subject",
    "total",
    "pass",
    "fail",
    "controller",
    "principal",
    "signature",
    "degree",
    "bachelor",
    "master",
    "programme",
    "program",
    "course",
    "batch",
    "register",
    "number",
    "date",
];

/// Lowercased line with punctuation folded to spaces, for keyword checks
pub fn fold_for_keywords(line: &str) -> String {
    let folded: String = line
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the line is a header/footer for the subject table
pub fn is_header_line(line: &str, extra_keywords: &[String]) -> bool {
    let folded = fold_for_keywords(line);
    if folded.is_empty() {
        return true;
    }

    if BARE_HEADERS.iter().any(|header| folded == *header) {
        return true;
    }

    if LABEL_PREFIXES.iter().any(|prefix| starts_with_words(&folded, prefix)) {
        return first_cell_is_label(line);
    }

    HEADER_PREFIXES
        .iter()
        .map(|prefix| prefix.to_string())
        .chain(extra_keywords.iter().map(|keyword| fold_for_keywords(keyword)))
        .any(|prefix| starts_with_words(&folded, &prefix))
}

/// Whole-word prefix match on folded text
fn starts_with_words(folded: &str, prefix: &str) -> bool {
    !prefix.is_empty()
        && folded
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
}

/// Text before the first column, delimiter or number holds only label words
fn first_cell_is_label(line: &str) -> bool {
    let cell = line
        .split(|c: char| c == ':' || c == '=' || c.is_ascii_digit())
        .next()
        .unwrap_or("");
    let cell = cell.split(COLUMN_SEPARATOR).next().unwrap_or("");
    fold_for_keywords(cell)
        .split(' ')
        .filter(|word| !word.is_empty())
        .all(|word| LABEL_WORDS.contains(&word))
}

/// Alphanumeric-only lowercase form used for reserved-word and duplicate checks
pub fn clean_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

pub fn is_reserved_name(name: &str) -> bool {
    let key = clean_key(name);
    RESERVED_NAMES.iter().any(|reserved| key == *reserved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lines() {
        assert!(is_header_line("TOTAL", &[]));
        assert!(is_header_line("Total Marks: 420", &[]));
        assert!(is_header_line("SEMESTER - III", &[]));
        assert!(is_header_line("Signature of the Controller", &[]));
        assert!(is_header_line("PRACTICAL", &[]));
        assert!(is_header_line("S. No.", &[]));
    }

    #[test]
    fn test_prefixes_match_whole_words() {
        assert!(!is_header_line("PLACEMENT TRAINING  20  55  PASS", &[]));
        assert!(!is_header_line("TOTAL QUALITY MANAGEMENT  20  55  PASS", &[]));
        assert!(!is_header_line("Resultant Mechanics  20  55  PASS", &[]));
        assert!(is_header_line("TOTAL  450  600  PASS", &[]));
        assert!(is_header_line("Grand Total  452", &[]));
        assert!(is_header_line("Result: PASS", &[]));
        assert!(is_header_line("Place: Coimbatore", &[]));
    }

    #[test]
    fn test_practical_only_bare() {
        assert!(!is_header_line("PHYSICS PRACTICAL  20  60  PASS", &[]));
        assert!(!is_header_line("MATHEMATICS  18  52  70  100  PASS", &[]));
    }

    #[test]
    fn test_extra_keywords() {
        let extra = vec!["Hall Ticket".to_string()];
        assert!(is_header_line("HALL TICKET NO 4411", &extra));
        assert!(!is_header_line("HALL TICKET NO 4411", &[]));
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved_name("P A S S"));
        assert!(is_reserved_name("Grand-Total"));
        assert!(!is_reserved_name("Passive Design"));
        assert_eq!(clean_key("Computer Sci. (Theory)"), "computerscitheory");
    }
}

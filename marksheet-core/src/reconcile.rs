use tracing::debug;

use crate::types::{
    DraftMarksheet, ExtractedMarksheet, ExtractionDiagnostics, ExtractionSource, SubjectResult,
    ValueSource,
};

/// Fill derived fields on a draft and attach confidence and warning.
///
/// A value supplied by the backend always wins; derived values are tagged
/// `Computed` so the reviewer can tell them apart.
pub fn reconcile(
    draft: DraftMarksheet,
    source: ExtractionSource,
    diagnostics: ExtractionDiagnostics,
    low_confidence_threshold: u8,
) -> ExtractedMarksheet {
    let subject_sum = draft
        .subjects
        .iter()
        .fold(0u32, |sum, subject| sum.saturating_add(subject.marks));

    let (total_marks, total_marks_source) = match draft.total_marks.filter(|total| !total.trim().is_empty()) {
        Some(total) => (total, Some(ValueSource::Extracted)),
        None if !draft.subjects.is_empty() => (subject_sum.to_string(), Some(ValueSource::Computed)),
        None => (String::new(), None),
    };

    let (overall_result, overall_result_source) = match draft.overall_result {
        Some(result) => (Some(result), Some(ValueSource::Extracted)),
        None if !draft.subjects.is_empty() => {
            // A subject with no result counts as not passed
            let all_passed = draft
                .subjects
                .iter()
                .all(|subject| subject.result.is_some_and(|result| result.is_pass()));
            let result = if all_passed {
                SubjectResult::Pass
            } else {
                SubjectResult::Fail
            };
            (Some(result), Some(ValueSource::Computed))
        }
        None => (None, None),
    };

    let confidence = draft.confidence.unwrap_or(0).min(100);
    let warning = (confidence < low_confidence_threshold).then(|| low_confidence_warning(confidence));

    debug!(
        subjects = draft.subjects.len(),
        total = %total_marks,
        ?total_marks_source,
        ?overall_result,
        confidence,
        "reconciled marksheet"
    );

    ExtractedMarksheet {
        student_name: draft.student_name.unwrap_or_default(),
        register_number: draft.register_number.unwrap_or_default(),
        subjects: draft.subjects,
        total_marks,
        total_marks_source,
        overall_result,
        overall_result_source,
        confidence,
        warning,
        source,
        diagnostics,
    }
}

pub fn low_confidence_warning(confidence: u8) -> String {
    format!(
        "Low recognition confidence ({confidence}%). Check every field against the original marksheet before saving."
    )
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExtractedMarksheet, SubjectRow};

/// Subject rows ready for the student/marks storage layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRowsDocument {
    pub format: String,
    pub student_name: String,
    pub register_number: String,
    pub rows: Vec<SubjectRow>,
    pub generated_at: DateTime<Utc>,
}

impl ExtractedMarksheet {
    pub fn to_rows_document(&self) -> SubjectRowsDocument {
        SubjectRowsDocument {
            format: "rows".to_string(),
            student_name: self.student_name.clone(),
            register_number: self.register_number.clone(),
            rows: self.to_subject_rows(),
            generated_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_to_json(&self, path: &str) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write marksheet: {path}"))?;
        Ok(())
    }

    /// Render as `marksheet` (full record, the default) or `rows`
    pub fn render_format(&self, format: &str) -> Result<String> {
        match format {
            "rows" => Ok(serde_json::to_string_pretty(&self.to_rows_document())?),
            _ => self.to_json(),
        }
    }

    pub fn save_with_format(&self, path: &str, format: &str) -> Result<()> {
        let json = self.render_format(format)?;
        std::fs::write(path, json).with_context(|| format!("failed to write output: {path}"))?;
        Ok(())
    }
}

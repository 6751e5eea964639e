//! Local recognition via tesseract and poppler-utils
//!
//! Images go through `tesseract ... tsv` so word boxes survive: words are
//! rejoined per line with a column separator wherever the horizontal gap is
//! wide, which the subject table patterns rely on. PDFs are read from their
//! text layer with `pdftotext -layout`; a scanned PDF with no usable text
//! layer has its first page rasterized with `pdftoppm` and OCR'd instead.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::process::run_with_timeout;
use super::RecognitionEngine;
use crate::config::LocalOcrConfig;
use crate::error::BackendError;
use crate::normalizer::COLUMN_SEPARATOR;
use crate::types::{MediaType, RawRecognitionResult};

/// Gap between words, in multiples of the word height, read as a column break
const COLUMN_GAP_FACTOR: f32 = 1.2;

pub struct TesseractEngine {
    config: LocalOcrConfig,
}

impl TesseractEngine {
    pub fn new(config: &LocalOcrConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn ocr_image(&self, path: &Path, language: &str) -> Result<RawRecognitionResult, BackendError> {
        let mut command = Command::new(&self.config.tesseract_cmd);
        command.arg(path).arg("stdout").arg("-l").arg(language);
        if let Some(psm) = self.config.page_segmentation_mode {
            command.arg("--psm").arg(psm.to_string());
        }
        command.arg("tsv");

        let output = run_with_timeout(command, &self.config.tesseract_cmd, self.config.timeout())?;
        let result = parse_tsv(&output.stdout);
        debug!(
            chars = result.text.len(),
            confidence = ?result.confidence,
            "tesseract finished"
        );
        Ok(result)
    }

    fn pdf_text_layer(&self, path: &Path) -> Result<String, BackendError> {
        let mut command = Command::new(&self.config.pdftotext_cmd);
        command
            .arg("-layout")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-");

        let output = run_with_timeout(command, &self.config.pdftotext_cmd, self.config.timeout())?;
        Ok(output.stdout)
    }

    /// Render page one of a PDF to PNG inside `workdir`
    fn rasterize_first_page(&self, path: &Path, workdir: &Path) -> Result<PathBuf, BackendError> {
        let prefix = workdir.join("page");
        let mut command = Command::new(&self.config.pdftoppm_cmd);
        command
            .args(["-f", "1", "-l", "1", "-singlefile", "-png", "-r", "300"])
            .arg(path)
            .arg(&prefix);

        run_with_timeout(command, &self.config.pdftoppm_cmd, self.config.timeout())?;

        let image = prefix.with_extension("png");
        if !image.exists() {
            return Err(BackendError::MalformedResponse(format!(
                "{} produced no image",
                self.config.pdftoppm_cmd
            )));
        }
        Ok(image)
    }

    fn recognize_pdf(&self, path: &Path, language: &str) -> Result<RawRecognitionResult, BackendError> {
        let text = self.pdf_text_layer(path)?;
        let visible_chars = text.chars().filter(|c| !c.is_whitespace()).count();

        if visible_chars >= self.config.min_text_layer_chars || !self.config.rasterize_empty_pdfs {
            debug!(visible_chars, "using PDF text layer");
            return Ok(RawRecognitionResult::new(text, None));
        }

        info!(visible_chars, "PDF text layer is empty, rasterizing first page for OCR");
        let workdir = tempfile::tempdir()?;
        let image = self.rasterize_first_page(path, workdir.path())?;
        self.ocr_image(&image, language)
    }
}

impl RecognitionEngine for TesseractEngine {
    fn recognize(
        &self,
        path: &Path,
        media_type: MediaType,
        language: &str,
    ) -> Result<RawRecognitionResult, BackendError> {
        let language = if language.trim().is_empty() {
            self.config.language.as_str()
        } else {
            language
        };

        if media_type.is_image() {
            self.ocr_image(path, language)
        } else {
            self.recognize_pdf(path, language)
        }
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

#[derive(Debug, Clone)]
struct TsvWord {
    line_key: (u32, u32, u32, u32),
    left: i32,
    width: i32,
    height: i32,
    confidence: f32,
    text: String,
}

fn parse_word(row: &str) -> Option<TsvWord> {
    let columns: Vec<&str> = row.splitn(12, '\t').collect();
    if columns.len() < 12 || columns[0] != "5" {
        return None;
    }

    let text = columns[11].trim();
    if text.is_empty() {
        return None;
    }

    let int = |index: usize| columns[index].trim().parse::<i32>().ok();
    let key = |index: usize| columns[index].trim().parse::<u32>().ok();

    Some(TsvWord {
        line_key: (key(1)?, key(2)?, key(3)?, key(4)?),
        left: int(6)?,
        width: int(8)?,
        height: int(9)?,
        confidence: columns[10].trim().parse().ok()?,
        text: text.to_string(),
    })
}

/// Rebuild text and mean word confidence from tesseract TSV output
pub fn parse_tsv(tsv: &str) -> RawRecognitionResult {
    let words: Vec<TsvWord> = tsv.lines().skip(1).filter_map(parse_word).collect();

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut previous: Option<&TsvWord> = None;

    for word in &words {
        match previous {
            Some(prev) if prev.line_key == word.line_key => {
                let gap = word.left - (prev.left + prev.width);
                let height = prev.height.max(word.height).max(1) as f32;
                if gap as f32 > COLUMN_GAP_FACTOR * height {
                    current.push_str(COLUMN_SEPARATOR);
                } else {
                    current.push(' ');
                }
            }
            Some(_) => lines.push(std::mem::take(&mut current)),
            None => {}
        }
        current.push_str(&word.text);
        previous = Some(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    let scored: Vec<f32> = words
        .iter()
        .map(|word| word.confidence)
        .filter(|confidence| *confidence >= 0.0)
        .collect();
    let confidence = if scored.is_empty() {
        None
    } else {
        let mean = scored.iter().sum::<f32>() / scored.len() as f32;
        Some(mean.round().clamp(0.0, 100.0) as u8)
    };

    RawRecognitionResult::new(lines.join("\n"), confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn row(line: u32, word: u32, left: i32, width: i32, conf: &str, text: &str) -> String {
        format!("5\t1\t1\t1\t{line}\t{word}\t{left}\t100\t{width}\t30\t{conf}\t{text}")
    }

    #[test]
    fn test_wide_gaps_become_column_separators() {
        let tsv = [
            HEADER.to_string(),
            "4\t1\t1\t1\t1\t0\t10\t100\t900\t30\t-1\t".to_string(),
            row(1, 1, 10, 120, "96.5", "COMPUTER"),
            row(1, 2, 140, 110, "91.0", "SCIENCE"),
            row(1, 3, 400, 40, "88.0", "18"),
            row(1, 4, 500, 40, "90.0", "52"),
            row(1, 5, 600, 80, "94.5", "PASS"),
            row(2, 1, 10, 100, "80.0", "ENGLISH"),
        ]
        .join("\n");

        let result = parse_tsv(&tsv);
        assert_eq!(result.text, "COMPUTER SCIENCE  18  52  PASS\nENGLISH");
        assert_eq!(result.confidence, Some(90));
    }

    #[test]
    fn test_blank_words_and_negative_confidence_ignored() {
        let tsv = [
            HEADER.to_string(),
            row(1, 1, 10, 50, "-1", " "),
            row(1, 2, 70, 50, "70", "Name:"),
            row(1, 3, 130, 60, "-1", "ASHA"),
        ]
        .join("\n");

        let result = parse_tsv(&tsv);
        assert_eq!(result.text, "Name: ASHA");
        assert_eq!(result.confidence, Some(70));
    }

    #[test]
    fn test_empty_tsv() {
        let result = parse_tsv(HEADER);
        assert!(result.text.is_empty());
        assert_eq!(result.confidence, None);
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_binary_is_spawn_error() {
        let engine = TesseractEngine::new(&LocalOcrConfig {
            tesseract_cmd: "marksheet-no-such-tesseract".to_string(),
            ..LocalOcrConfig::default()
        });
        let err = engine
            .recognize(Path::new("scan.png"), MediaType::Png, "eng")
            .unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }
}

//! Extraction Types
//!
//! Defines the result object produced by the OCR and PDF text extractors.
//! The webhook engine only ever reads these.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single `[x, y]` vertex in pixel space
pub type Point = [f64; 2];

/// Result of a text extraction run over one uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Whether extraction finished without error
    pub success: bool,
    /// Original file name, if the upload carried one
    #[serde(default)]
    pub filename: Option<String>,
    /// Recognized segments, in reading order
    #[serde(default)]
    pub results: Vec<TextSegment>,
    /// Number of segments the extractor reported
    #[serde(default)]
    pub text_count: usize,
    /// Pre-combined text (PDF extraction fills this in)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text_content: Option<String>,
    /// Extractor tag, e.g. "paddleocr" or "pdf_comprehensive"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_method: Option<String>,
    /// Extractor-specific fields (file size, page counts, message)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One recognized line (OCR) or page (native PDF text)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    /// Confidence in `[0, 1]`
    #[serde(default)]
    pub confidence: f64,
    /// Bounding polygon; `None` for page-level native text
    #[serde(default)]
    pub bbox: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// "native", "ocr", "no_text" or "error" for PDF pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TextSegment {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox: None,
            page: None,
            text_type: None,
            extra: Map::new(),
        }
    }

    pub fn with_bbox(mut self, bbox: Vec<Point>) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

impl ExtractionResult {
    /// Build a successful result from segments, counting them
    pub fn from_segments(filename: Option<&str>, results: Vec<TextSegment>) -> Self {
        Self {
            success: true,
            filename: filename.map(str::to_string),
            text_count: results.len(),
            results,
            full_text_content: None,
            processing_method: None,
            extra: Map::new(),
        }
    }

    /// Text content joined for delivery.
    ///
    /// Prefers the extractor's pre-combined text; otherwise joins every
    /// non-empty segment with a single space.
    pub fn combined_text(&self) -> String {
        if let Some(text) = self.full_text_content.as_deref().filter(|t| !t.is_empty()) {
            return text.to_string();
        }

        self.results
            .iter()
            .map(|segment| segment.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Sample result used by the webhook test endpoints
    pub fn sample() -> Self {
        let mut result = Self::from_segments(
            Some("test_sample.jpg"),
            vec![
                TextSegment::new("Test OCR Result", 0.95).with_bbox(vec![
                    [0.0, 0.0],
                    [100.0, 0.0],
                    [100.0, 20.0],
                    [0.0, 20.0],
                ]),
                TextSegment::new("Sample Text", 0.87).with_bbox(vec![
                    [0.0, 30.0],
                    [80.0, 30.0],
                    [80.0, 50.0],
                    [0.0, 50.0],
                ]),
            ],
        );
        result.processing_method = Some("test".to_string());
        result
    }
}

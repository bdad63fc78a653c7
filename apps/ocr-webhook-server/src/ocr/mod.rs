//! OCR Module
//!
//! Result types handed over by the text extractors (PaddleOCR for images,
//! native text plus OCR fallback for PDFs). The extractors themselves run
//! outside this crate; everything here is the data contract the webhook
//! engine consumes.

mod types;

pub use types::{ExtractionResult, Point, TextSegment};

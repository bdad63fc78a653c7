//! OCR Webhook Server Library
//!
//! Forwards text extraction results to dynamically configured webhook
//! endpoints. The main server binary is in main.rs.
//!
//! # Modules
//!
//! - `ocr`: Extraction result types consumed by the webhook engine
//! - `webhook`: Configuration store, payload builder, delivery and dispatch
//! - `routes`: Management HTTP API

pub mod config;
pub mod error;
pub mod ocr;
pub mod routes;
pub mod state;
pub mod webhook;

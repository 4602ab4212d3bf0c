// src/extractors/mod.rs
pub mod assembler;
pub mod config;
pub mod dedup;
pub mod detectors;
pub mod patterns;
pub mod question;
pub mod tokenizer;
pub mod year_filter;

// Re-export key extraction types for convenience
#[allow(unused_imports)]
pub use assembler::{ExtractionResult, ExtractionStats};
#[allow(unused_imports)]
pub use config::{DetectionMode, ExtractionConfig};
#[allow(unused_imports)]
pub use detectors::{Candidate, Strategy};
pub use question::{ExtractionTrace, QuestionExtractor};

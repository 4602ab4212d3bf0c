// src/extractors/question.rs

// --- Imports ---
use crate::extractors::assembler::ExtractionResult;
use crate::extractors::config::{DetectionMode, ExtractionConfig};
use crate::extractors::dedup::resolve_overlaps;
use crate::extractors::detectors::{Candidate, ContextDetector, Detector, NumberedDetector, ParagraphDetector, Strategy};
use crate::extractors::patterns::YearPattern;
use crate::extractors::tokenizer::Document;
use crate::extractors::year_filter::{ConfirmedBlock, YearFilter};
use crate::utils::error::ExtractError;

/// A raw candidate and whether the year filter accepted it.
#[derive(Debug, Clone)]
pub struct TracedCandidate {
    pub candidate: Candidate,
    pub confirmed: bool,
}

/// Everything one run produced, kept around for debug reports.
#[derive(Debug)]
pub struct ExtractionTrace<'a> {
    pub document: Document<'a>,
    pub candidates: Vec<TracedCandidate>,
    pub outcome: Result<ExtractionResult, ExtractError>,
}

/// The extraction engine. Holds only validated configuration, so one instance
/// can serve any number of independent requests.
#[derive(Debug)]
pub struct QuestionExtractor {
    config: ExtractionConfig,
    year: YearPattern,
}

impl QuestionExtractor {
    /// Validates `config` up front; a bad configuration never reaches scanning.
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        let year = config.validate()?;
        Ok(Self { config, year })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn extract(&self, text: &str) -> Result<ExtractionResult, ExtractError> {
        self.trace(text).outcome
    }

    /// Runs the full pipeline: tokenize, detect, filter, deduplicate, assemble.
    pub fn trace<'a>(&self, text: &'a str) -> ExtractionTrace<'a> {
        tracing::info!("Extracting '{}' questions from {} bytes of text", self.year.token(), text.len());

        let document = Document::parse(text);
        let lines = document.lines();

        // 1. Detect: every strategy scans the same read-only lines.
        let detectors: Vec<Box<dyn Detector + '_>> = vec![
            Box::new(NumberedDetector::new(self.config.confidence_of(Strategy::Numbered))),
            Box::new(ParagraphDetector::new(
                self.config.confidence_of(Strategy::Paragraph),
                self.config.min_paragraph_lines,
                self.config.max_paragraph_lines,
                self.config.min_paragraph_chars,
            )),
            Box::new(ContextDetector::new(
                self.config.confidence_of(Strategy::Context),
                &self.year,
                self.config.context_before,
                self.config.context_after,
                self.config.min_context_chars,
            )),
        ];
        let mut candidates = Vec::new();
        for detector in &detectors {
            let found = detector.detect(lines);
            tracing::debug!("{} detector proposed {} candidates", detector.strategy(), found.len());
            candidates.extend(found);
        }

        // 2. Year filter, per candidate.
        let filter = YearFilter::new(&self.year, self.config.trailing_window);
        let mut traced = Vec::with_capacity(candidates.len());
        let mut confirmed = Vec::new();
        for candidate in candidates {
            match filter.confirm(candidate.clone(), lines) {
                Some(block) => {
                    confirmed.push(block);
                    traced.push(TracedCandidate { candidate, confirmed: true });
                }
                None => traced.push(TracedCandidate { candidate, confirmed: false }),
            }
        }
        tracing::debug!("{} of {} candidates reference '{}'", confirmed.len(), traced.len(), self.year.token());

        // 3. Deduplicate and assemble.
        let confirmed = self.apply_mode(confirmed);
        let blocks = resolve_overlaps(confirmed, &document);
        let outcome = ExtractionResult::assemble(self.year.token(), blocks);
        match &outcome {
            Ok(result) => tracing::info!("Extraction finished: {:?}", result.stats),
            Err(e) => tracing::info!("Extraction finished without blocks: {}", e),
        }

        ExtractionTrace { document, candidates: traced, outcome }
    }

    /// In fallback mode only the best-ranked strategy that confirmed anything survives.
    fn apply_mode(&self, confirmed: Vec<ConfirmedBlock>) -> Vec<ConfirmedBlock> {
        if self.config.mode == DetectionMode::Independent {
            return confirmed;
        }
        let top = self
            .config
            .confidence_order
            .iter()
            .copied()
            .find(|s| confirmed.iter().any(|b| b.candidate.strategy == *s));
        match top {
            Some(strategy) => {
                tracing::debug!("Fallback mode: keeping only {} blocks", strategy);
                confirmed.into_iter().filter(|b| b.candidate.strategy == strategy).collect()
            }
            None => confirmed,
        }
    }
}

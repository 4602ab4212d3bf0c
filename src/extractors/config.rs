// src/extractors/config.rs

use crate::extractors::detectors::Strategy;
use crate::extractors::patterns::YearPattern;
use crate::utils::error::ExtractError;
use std::str::FromStr;

pub const DEFAULT_TARGET_YEAR: &str = "24년";

/// How detector outputs are combined before deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    /// Every detector feeds the deduplicator.
    #[default]
    Independent,
    /// Only the highest-ranked strategy that confirmed anything contributes.
    Fallback,
}

impl FromStr for DetectionMode {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "independent" => Ok(DetectionMode::Independent),
            "fallback" => Ok(DetectionMode::Fallback),
            other => Err(ExtractError::Configuration(format!("unknown detection mode '{}'", other))),
        }
    }
}

/// Tunables for one extraction. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    pub target_year: String,
    pub min_paragraph_lines: usize,
    pub max_paragraph_lines: usize,
    /// Non-whitespace characters a paragraph needs.
    pub min_paragraph_chars: usize,
    pub min_context_chars: usize,
    pub context_before: usize,
    pub context_after: usize,
    /// Lines after a block the year filter may still look at.
    pub trailing_window: usize,
    /// Strategies from most to least trusted.
    pub confidence_order: Vec<Strategy>,
    pub mode: DetectionMode,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            target_year: DEFAULT_TARGET_YEAR.to_string(),
            min_paragraph_lines: 1,
            max_paragraph_lines: 30,
            min_paragraph_chars: 20,
            min_context_chars: 30,
            context_before: 2,
            context_after: 5,
            trailing_window: 2,
            confidence_order: Strategy::ALL.to_vec(),
            mode: DetectionMode::Independent,
        }
    }
}

impl ExtractionConfig {
    /// Defaults overridden by `EXAM_TARGET_YEAR`, `EXAM_MIN_LINES`,
    /// `EXAM_MAX_LINES` and `EXAM_MIN_CHARS` when set.
    pub fn from_env() -> Result<Self, ExtractError> {
        let mut config = Self::default();
        if let Ok(year) = std::env::var("EXAM_TARGET_YEAR") {
            tracing::debug!("Using EXAM_TARGET_YEAR={}", year);
            config.target_year = year;
        }
        if let Some(v) = env_usize("EXAM_MIN_LINES")? {
            config.min_paragraph_lines = v;
        }
        if let Some(v) = env_usize("EXAM_MAX_LINES")? {
            config.max_paragraph_lines = v;
        }
        if let Some(v) = env_usize("EXAM_MIN_CHARS")? {
            config.min_paragraph_chars = v;
        }
        Ok(config)
    }

    /// Parses a comma-separated ordering such as "numbered,paragraph,context".
    pub fn parse_order(spec: &str) -> Result<Vec<Strategy>, ExtractError> {
        spec.split(',').map(Strategy::from_str).collect()
    }

    /// Checks the configuration and compiles the year matchers.
    pub fn validate(&self) -> Result<YearPattern, ExtractError> {
        if self.max_paragraph_lines == 0 {
            return Err(ExtractError::Configuration("max paragraph lines must be at least 1".to_string()));
        }
        if self.min_paragraph_lines > self.max_paragraph_lines {
            return Err(ExtractError::Configuration(format!(
                "min paragraph lines ({}) exceeds max paragraph lines ({})",
                self.min_paragraph_lines, self.max_paragraph_lines
            )));
        }
        if self.confidence_order.len() != Strategy::ALL.len()
            || Strategy::ALL.iter().any(|s| !self.confidence_order.contains(s))
        {
            return Err(ExtractError::Configuration(format!(
                "confidence order must name each strategy exactly once, got {:?}",
                self.confidence_order
            )));
        }
        YearPattern::compile(&self.target_year)
    }

    /// Confidence rank of a strategy; the first entry of the ordering ranks highest.
    pub fn confidence_of(&self, strategy: Strategy) -> u8 {
        let position = self
            .confidence_order
            .iter()
            .position(|s| *s == strategy)
            .unwrap_or(self.confidence_order.len());
        (self.confidence_order.len() - position) as u8
    }
}

fn env_usize(name: &str) -> Result<Option<usize>, ExtractError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ExtractError::Configuration(format!("{} must be a non-negative integer: {}", name, e))),
        Err(_) => Ok(None),
    }
}

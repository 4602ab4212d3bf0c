// src/extractors/detectors.rs

// --- Imports ---
use crate::extractors::patterns::{self, YearPattern};
use crate::extractors::tokenizer::Line;
use crate::utils::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// --- Data Structures ---

/// Which detector proposed a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Numbered,
    Paragraph,
    Context,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Numbered, Strategy::Paragraph, Strategy::Context];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Numbered => "numbered",
            Strategy::Paragraph => "paragraph",
            Strategy::Context => "context",
        }
    }

    /// Section heading used in the report artifact.
    pub fn report_heading(&self) -> &'static str {
        match self {
            Strategy::Numbered => "[ 번호가 있는 문제 ]",
            Strategy::Paragraph => "[ 문단 형식 문제 ]",
            Strategy::Context => "[ 문맥 기반 추출 ]",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numbered" => Ok(Strategy::Numbered),
            "paragraph" => Ok(Strategy::Paragraph),
            "context" => Ok(Strategy::Context),
            other => Err(ExtractError::Configuration(format!("unknown strategy '{}'", other))),
        }
    }
}

/// A block proposed by one detector, not yet checked against the target year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub strategy: Strategy,
    pub start_line: usize,
    pub end_line: usize,
    /// Normalized text of the covered lines, newline-joined.
    pub text: String,
    /// Rank from the configured ordering; higher wins overlaps.
    pub confidence: u8,
}

impl Candidate {
    pub fn from_lines(strategy: Strategy, confidence: u8, lines: &[Line], start_line: usize, end_line: usize) -> Self {
        debug_assert!(start_line <= end_line && end_line < lines.len());
        let text = lines[start_line..=end_line]
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self { strategy, start_line, end_line, text, confidence }
    }

    /// Number of lines covered.
    pub fn span(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    pub fn overlaps(&self, other: &Candidate) -> bool {
        self.start_line <= other.end_line && other.start_line <= self.end_line
    }
}

/// Common seam for the block detection strategies.
/// Detectors only read the line sequence and never see each other's output.
pub trait Detector {
    fn strategy(&self) -> Strategy;
    fn detect(&self, lines: &[Line]) -> Vec<Candidate>;
}

/// Shrinks `start..=end` past blank lines at both edges.
fn trim_blank_edges(lines: &[Line], mut start: usize, mut end: usize) -> Option<(usize, usize)> {
    while start <= end && lines[start].is_blank() {
        start += 1;
    }
    while end > start && lines[end].is_blank() {
        end -= 1;
    }
    if start > end || lines[start].is_blank() {
        None
    } else {
        Some((start, end))
    }
}

fn char_count(lines: &[Line]) -> usize {
    lines.iter().map(|l| l.text.chars().filter(|c| !c.is_whitespace()).count()).sum()
}

// --- Numbered-Question Detector ---

/// Opens a block at every line-leading question marker and closes it just
/// before the next marker (or at end of text).
pub struct NumberedDetector {
    confidence: u8,
}

impl NumberedDetector {
    pub fn new(confidence: u8) -> Self {
        Self { confidence }
    }
}

impl Detector for NumberedDetector {
    fn strategy(&self) -> Strategy {
        Strategy::Numbered
    }

    fn detect(&self, lines: &[Line]) -> Vec<Candidate> {
        let starts: Vec<usize> = lines
            .iter()
            .filter(|l| patterns::is_numbered_marker(&l.text))
            .map(|l| l.index)
            .collect();

        let mut candidates = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map(|next| next - 1).unwrap_or(lines.len() - 1);
            if let Some((s, e)) = trim_blank_edges(lines, start, end) {
                tracing::trace!("Numbered candidate at lines {}..={}", s, e);
                candidates.push(Candidate::from_lines(Strategy::Numbered, self.confidence, lines, s, e));
            }
        }
        candidates
    }
}

// --- Paragraph-Block Detector ---

/// Blank-line-delimited runs of text whose size looks like a single question.
pub struct ParagraphDetector {
    confidence: u8,
    min_lines: usize,
    max_lines: usize,
    min_chars: usize,
}

impl ParagraphDetector {
    pub fn new(confidence: u8, min_lines: usize, max_lines: usize, min_chars: usize) -> Self {
        Self { confidence, min_lines, max_lines, min_chars }
    }

    fn accepts(&self, group: &[Line]) -> bool {
        let len = group.len();
        len >= self.min_lines && len <= self.max_lines && char_count(group) >= self.min_chars
    }
}

impl Detector for ParagraphDetector {
    fn strategy(&self) -> Strategy {
        Strategy::Paragraph
    }

    fn detect(&self, lines: &[Line]) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            if lines[i].is_blank() {
                i += 1;
                continue;
            }
            let start = i;
            while i < lines.len() && !lines[i].is_blank() {
                i += 1;
            }
            let end = i - 1;
            let group = &lines[start..=end];
            if self.accepts(group) {
                tracing::trace!("Paragraph candidate at lines {}..={}", start, end);
                candidates.push(Candidate::from_lines(Strategy::Paragraph, self.confidence, lines, start, end));
            } else {
                tracing::trace!("Skipping paragraph at lines {}..={} ({} lines, {} chars)", start, end, group.len(), char_count(group));
            }
        }
        candidates
    }
}

// --- Contextual-Year Detector ---

/// Catch-all for malformed documents: a window of lines around any line that
/// names the target year while exam vocabulary sits nearby.
pub struct ContextDetector<'y> {
    confidence: u8,
    year: &'y YearPattern,
    before: usize,
    after: usize,
    min_chars: usize,
}

impl<'y> ContextDetector<'y> {
    pub fn new(confidence: u8, year: &'y YearPattern, before: usize, after: usize, min_chars: usize) -> Self {
        Self { confidence, year, before, after, min_chars }
    }
}

impl Detector for ContextDetector<'_> {
    fn strategy(&self) -> Strategy {
        Strategy::Context
    }

    fn detect(&self, lines: &[Line]) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            if !self.year.mentions(&lines[i].text) {
                i += 1;
                continue;
            }

            let lo = i.saturating_sub(self.before);
            let hi = (i + self.after).min(lines.len() - 1);
            if !lines[lo..=hi].iter().any(|l| patterns::has_exam_vocabulary(&l.text)) {
                i += 1;
                continue;
            }

            if let Some((s, e)) = trim_blank_edges(lines, lo, hi) {
                if char_count(&lines[s..=e]) >= self.min_chars {
                    tracing::trace!("Context candidate at lines {}..={} (anchor {})", s, e, i);
                    candidates.push(Candidate::from_lines(Strategy::Context, self.confidence, lines, s, e));
                }
            }
            // Resume past the window so context blocks never overlap each other.
            i = hi + 1;
        }
        candidates
    }
}

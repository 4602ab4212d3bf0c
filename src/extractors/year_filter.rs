// src/extractors/year_filter.rs

use crate::extractors::detectors::Candidate;
use crate::extractors::patterns::{self, YearPattern};
use crate::extractors::tokenizer::Line;

/// A candidate whose text (or trailing context) refers to the target year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedBlock {
    pub candidate: Candidate,
    /// First line carrying the year reference; may sit in the trailing context.
    pub year_line: usize,
}

/// Decides whether a candidate really talks about the target year rather than
/// containing the number by accident (page numbers, scores, unrelated dates).
pub struct YearFilter<'y> {
    year: &'y YearPattern,
    trailing_window: usize,
}

impl<'y> YearFilter<'y> {
    pub fn new(year: &'y YearPattern, trailing_window: usize) -> Self {
        Self { year, trailing_window }
    }

    /// Consumes the candidate; `None` means it is discarded.
    pub fn confirm(&self, candidate: Candidate, lines: &[Line]) -> Option<ConfirmedBlock> {
        let lo = candidate.start_line;
        let hi = self.trailing_end(&candidate, lines);

        match (lo..=hi).find(|&i| self.line_confirms(&lines[i].text)) {
            Some(year_line) => {
                tracing::trace!(
                    "Confirmed {} candidate {}..={} via line {}",
                    candidate.strategy, candidate.start_line, candidate.end_line, year_line
                );
                Some(ConfirmedBlock { candidate, year_line })
            }
            None => {
                tracing::trace!(
                    "Rejected {} candidate {}..={}: no '{}' reference",
                    candidate.strategy, candidate.start_line, candidate.end_line, self.year.token()
                );
                None
            }
        }
    }

    /// Last line of the block plus its immediate trailing context. The context
    /// stops at a blank line or at the next question marker.
    fn trailing_end(&self, candidate: &Candidate, lines: &[Line]) -> usize {
        let mut end = candidate.end_line;
        for line in lines.iter().skip(candidate.end_line + 1).take(self.trailing_window) {
            if line.is_blank() || patterns::is_numbered_marker(&line.text) {
                break;
            }
            end = line.index;
        }
        end
    }

    /// Strong year tokens count on their own; a bare year number only with an
    /// exam name right next to it. Question numbers and counts never count.
    fn line_confirms(&self, text: &str) -> bool {
        self.year.strong_match(text) || self.year.weak_match_with_exam(text)
    }
}

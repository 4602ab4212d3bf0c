// src/extractors/dedup.rs

use crate::extractors::detectors::Strategy;
use crate::extractors::tokenizer::Document;
use crate::extractors::year_filter::ConfirmedBlock;
use serde::Serialize;
use std::cmp::Reverse;

/// Final, non-overlapping block. `text` is the original source slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalBlock {
    pub strategy: Strategy,
    pub start_line: usize,
    pub end_line: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

/// Reconciles overlapping confirmed blocks into one canonical set.
///
/// Blocks are swept in document order while holding the current winner. An
/// overlapping block replaces the winner only with higher confidence, or with
/// equal confidence and a larger span. The losers are dropped.
pub fn resolve_overlaps(mut confirmed: Vec<ConfirmedBlock>, document: &Document<'_>) -> Vec<CanonicalBlock> {
    // Total order, so the outcome never depends on detector output order.
    confirmed.sort_by_key(|b| {
        let c = &b.candidate;
        (c.start_line, Reverse(c.confidence), Reverse(c.span()), c.end_line, c.strategy)
    });

    let mut kept: Vec<ConfirmedBlock> = Vec::with_capacity(confirmed.len());
    let mut current: Option<ConfirmedBlock> = None;

    for block in confirmed {
        current = match current.take() {
            None => Some(block),
            Some(winner) if !winner.candidate.overlaps(&block.candidate) => {
                kept.push(winner);
                Some(block)
            }
            Some(winner) => {
                if beats(&block, &winner) {
                    tracing::debug!(
                        "Overlap: {} {}..={} replaces {} {}..={}",
                        block.candidate.strategy, block.candidate.start_line, block.candidate.end_line,
                        winner.candidate.strategy, winner.candidate.start_line, winner.candidate.end_line
                    );
                    Some(block)
                } else {
                    tracing::debug!(
                        "Overlap: dropping {} {}..={} in favour of {} {}..={}",
                        block.candidate.strategy, block.candidate.start_line, block.candidate.end_line,
                        winner.candidate.strategy, winner.candidate.start_line, winner.candidate.end_line
                    );
                    Some(winner)
                }
            }
        };
    }
    kept.extend(current);

    kept.into_iter()
        .map(|b| {
            let c = b.candidate;
            let lines = document.lines();
            CanonicalBlock {
                strategy: c.strategy,
                start_line: c.start_line,
                end_line: c.end_line,
                start_offset: lines[c.start_line].start_offset,
                end_offset: lines[c.end_line].end_offset,
                text: document.slice(c.start_line, c.end_line).to_string(),
            }
        })
        .collect()
}

fn beats(challenger: &ConfirmedBlock, winner: &ConfirmedBlock) -> bool {
    let (a, b) = (&challenger.candidate, &winner.candidate);
    a.confidence > b.confidence || (a.confidence == b.confidence && a.span() > b.span())
}

// src/extractors/assembler.rs

use crate::extractors::dedup::CanonicalBlock;
use crate::extractors::detectors::Strategy;
use crate::utils::error::ExtractError;
use serde::{Deserialize, Serialize};

const BANNER_WIDTH: usize = 70;
const ENTRY_RULE_WIDTH: usize = 50;

/// Per-strategy counts reported with every extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_found: usize,
    pub numbered: usize,
    pub paragraph: usize,
    pub context: usize,
}

impl ExtractionStats {
    pub fn tally(blocks: &[CanonicalBlock]) -> Self {
        let mut stats = Self { total_found: blocks.len(), ..Self::default() };
        for block in blocks {
            match block.strategy {
                Strategy::Numbered => stats.numbered += 1,
                Strategy::Paragraph => stats.paragraph += 1,
                Strategy::Context => stats.context += 1,
            }
        }
        stats
    }
}

/// Outcome of one extraction request. Lives only as long as the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionResult {
    pub target_year: String,
    pub blocks: Vec<CanonicalBlock>,
    pub stats: ExtractionStats,
}

impl ExtractionResult {
    /// Builds the result from deduplicated blocks, already in document order.
    /// An empty block list is reported as `EmptyResult`.
    pub fn assemble(target_year: &str, blocks: Vec<CanonicalBlock>) -> Result<Self, ExtractError> {
        if blocks.is_empty() {
            return Err(ExtractError::EmptyResult(target_year.to_string()));
        }
        let stats = ExtractionStats::tally(&blocks);
        tracing::debug!("Assembled {} blocks: {:?}", blocks.len(), stats);
        Ok(Self { target_year: target_year.to_string(), blocks, stats })
    }

    /// The downloadable artifact: original block text joined by blank lines.
    pub fn to_text(&self) -> String {
        let mut out = self
            .blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        out.push('\n');
        out
    }

    /// Human-oriented report: banner, source name, count, then blocks grouped
    /// by the strategy that found them.
    pub fn render_report(&self, source_name: &str) -> String {
        let banner = "=".repeat(BANNER_WIDTH);
        let section_rule = "-".repeat(BANNER_WIDTH);
        let entry_rule = "-".repeat(ENTRY_RULE_WIDTH);

        let mut out = String::new();
        out.push_str(&format!("{banner}\n{} 모의고사 문제 추출 결과\n{banner}\n\n", self.target_year));
        out.push_str(&format!("원본 파일: {}\n", source_name));
        out.push_str(&format!("추출된 항목: {}개\n", self.stats.total_found));
        out.push_str(&format!("{banner}\n\n"));

        let mut first_section = true;
        for strategy in Strategy::ALL {
            let group: Vec<&CanonicalBlock> = self.blocks.iter().filter(|b| b.strategy == strategy).collect();
            if group.is_empty() {
                continue;
            }
            if !first_section {
                out.push_str("\n\n");
            }
            first_section = false;

            out.push_str(strategy.report_heading());
            out.push('\n');
            out.push_str(&section_rule);
            out.push_str("\n\n");
            for (i, block) in group.iter().enumerate() {
                match strategy {
                    Strategy::Numbered => {}
                    Strategy::Paragraph => out.push_str(&format!("[{}]\n", i + 1)),
                    Strategy::Context => out.push_str(&format!("[추출 {}]\n", i + 1)),
                }
                out.push_str(block.text.trim());
                out.push_str(&format!("\n\n{entry_rule}\n\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(strategy: Strategy, start: usize, text: &str) -> CanonicalBlock {
        CanonicalBlock {
            strategy,
            start_line: start,
            end_line: start,
            start_offset: 0,
            end_offset: text.len(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_empty_blocks_is_empty_result() {
        let err = ExtractionResult::assemble("24년", Vec::new()).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyResult(ref y) if y == "24년"));
    }

    #[test]
    fn test_stats_and_joined_text() {
        let result = ExtractionResult::assemble(
            "24년",
            vec![
                block(Strategy::Numbered, 0, "1. 첫 문제\n  보기"),
                block(Strategy::Context, 4, "24년 기출 문맥"),
                block(Strategy::Numbered, 8, "3. 셋째"),
            ],
        )
        .unwrap();
        assert_eq!(result.stats, ExtractionStats { total_found: 3, numbered: 2, paragraph: 0, context: 1 });
        assert_eq!(result.to_text(), "1. 첫 문제\n  보기\n\n24년 기출 문맥\n\n3. 셋째\n");
    }

    #[test]
    fn test_stats_serialize_with_expected_keys() {
        let stats = ExtractionStats { total_found: 1, numbered: 1, paragraph: 0, context: 0 };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json, serde_json::json!({"total_found": 1, "numbered": 1, "paragraph": 0, "context": 0}));
    }

    #[test]
    fn test_report_groups_by_strategy() {
        let result = ExtractionResult::assemble(
            "24년",
            vec![block(Strategy::Paragraph, 0, "문단 하나"), block(Strategy::Numbered, 3, "2. 번호 문제")],
        )
        .unwrap();
        let report = result.render_report("exam.txt");
        assert!(report.contains("24년 모의고사 문제 추출 결과"));
        assert!(report.contains("원본 파일: exam.txt"));
        assert!(report.contains("추출된 항목: 2개"));
        let numbered_at = report.find("[ 번호가 있는 문제 ]").unwrap();
        let paragraph_at = report.find("[ 문단 형식 문제 ]").unwrap();
        assert!(numbered_at < paragraph_at);
        assert!(report.contains("[1]\n문단 하나"));
        assert!(!report.contains("[ 문맥 기반 추출 ]"));
    }
}

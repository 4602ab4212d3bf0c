// src/utils/debug_report.rs
use crate::extractors::detectors::{Candidate, Strategy};
use crate::extractors::question::ExtractionTrace;
use std::fmt::Write;

/// What happened to one candidate over the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Rejected,
    Dropped,
    Kept,
}

impl Fate {
    fn label(&self) -> &'static str {
        match self {
            Fate::Rejected => "rejected",
            Fate::Dropped => "dropped",
            Fate::Kept => "kept",
        }
    }
}

/// Renders the source with every raw candidate annotated next to the lines it covers.
///
/// Each line carries one column per strategy (N, P, C): upper case when a kept
/// block covers it, lower case for a confirmed-but-dropped candidate, `.` for a
/// candidate the year filter rejected, blank when nothing covered it.
pub fn render_candidate_report(trace: &ExtractionTrace<'_>) -> String {
    let kept: Vec<(Strategy, usize, usize)> = match &trace.outcome {
        Ok(result) => result.blocks.iter().map(|b| (b.strategy, b.start_line, b.end_line)).collect(),
        Err(_) => Vec::new(),
    };
    let fate = |c: &Candidate, confirmed: bool| {
        if !confirmed {
            Fate::Rejected
        } else if kept.contains(&(c.strategy, c.start_line, c.end_line)) {
            Fate::Kept
        } else {
            Fate::Dropped
        }
    };

    let mut out = String::new();
    let confirmed = trace.candidates.iter().filter(|t| t.confirmed).count();
    let _ = writeln!(
        out,
        "# {} candidates, {} confirmed, {} kept",
        trace.candidates.len(),
        confirmed,
        kept.len()
    );
    match &trace.outcome {
        Ok(result) => {
            let _ = writeln!(out, "# stats: {:?}", result.stats);
        }
        Err(e) => {
            let _ = writeln!(out, "# outcome: {}", e);
        }
    }
    for traced in &trace.candidates {
        let c = &traced.candidate;
        let _ = writeln!(
            out,
            "#   {:<9} lines {:>4}..={:<4} confidence {} {}",
            c.strategy,
            c.start_line,
            c.end_line,
            c.confidence,
            fate(c, traced.confirmed).label()
        );
    }
    out.push('\n');

    let lines = trace.document.lines();
    let mut columns = vec![[' '; 3]; lines.len()];
    // Weaker marks first so a kept block always shows on top.
    for pass in [Fate::Rejected, Fate::Dropped, Fate::Kept] {
        for traced in &trace.candidates {
            let c = &traced.candidate;
            if fate(c, traced.confirmed) != pass {
                continue;
            }
            let (slot, letter) = match c.strategy {
                Strategy::Numbered => (0, 'n'),
                Strategy::Paragraph => (1, 'p'),
                Strategy::Context => (2, 'c'),
            };
            let mark = match pass {
                Fate::Rejected => '.',
                Fate::Dropped => letter,
                Fate::Kept => letter.to_ascii_uppercase(),
            };
            for column in &mut columns[c.start_line..=c.end_line] {
                column[slot] = mark;
            }
        }
    }

    for (line, column) in lines.iter().zip(&columns) {
        let marks: String = column.iter().collect();
        let _ = writeln!(out, "{:>5} {} | {}", line.index, marks, line.text);
    }
    out
}

// src/extractors/patterns.rs

// --- Imports ---
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;

// --- Regex Patterns for Line Matching (Lazy Static) ---

// Question-number marker at the very start of a line: "1.", "12)", "(3)", "[4]", "문제 5."
// The marker may not run into another digit, so "1.5점" or "3.14" never opens a question.
static NUMBERED_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:문제\s*)?(?:\d{1,3}\s*[.)．]|\(\d{1,3}\)|\[\d{1,3}\])(?:[^\d]|$)")
        .expect("Failed to compile NUMBERED_MARKER_RE")
});

// The marker itself, for stripping it off before looking for a year number.
static MARKER_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:문제\s*)?(?:\d{1,3}\s*[.)．]|\(\d{1,3}\)|\[\d{1,3}\])")
        .expect("Failed to compile MARKER_PREFIX_RE")
});

// Lines that carry nothing but a page number: "- 24 -", "24", "p. 24", "(24)", "24 / 40"
static PAGE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:[-–—]\s*\d{1,4}\s*[-–—]|(?:p\.?|page)\s*\d{1,4}|\d{1,4}(?:\s*/\s*\d{1,4})?|\(\s*\d{1,4}\s*\))\s*$")
        .expect("Failed to compile PAGE_NUMBER_RE")
});

// Exam-type vocabulary that makes a bare year number meaningful.
static EXAM_VOCABULARY_RE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Korean mock-exam / CSAT terms
        r"모의고사|모의평가|모평|수능|수학능력|학력평가|학평|평가원|교육청|사관학교|경찰대",
        // Generic exam/question terms
        r"기출|시험|학년도|문항|문제|정답|해설|출제|중간고사|기말고사",
        // English fallbacks seen in converted documents
        r"(?i)\b(?:exam|test|quiz|question|mock)s?\b",
    ]
    .iter()
    .filter_map(|pat| Regex::new(pat).ok())
    .collect()
});

// Exam names that may sit right next to a bare year number ("2024 모의고사", "수능 2024").
// Generic words such as 문제, 문항 or 정답 are left out: next to a number they
// mean a question number or a count, not a year.
const EXAM_NAME_TERMS: &str =
    r"모의고사|모의평가|모평|수능|수학능력시험|학력평가|학평|평가원|교육청|기출|중간고사|기말고사|시험|(?i:exam|mock)";

/// True when the line starts with a question-number marker.
pub fn is_numbered_marker(line: &str) -> bool {
    NUMBERED_MARKER_RE.is_match(line)
}

/// The line with any leading question-number marker removed.
pub fn strip_numbered_marker(line: &str) -> &str {
    if !is_numbered_marker(line) {
        return line;
    }
    match MARKER_PREFIX_RE.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

/// True when the line is just a page number.
pub fn is_page_number(line: &str) -> bool {
    PAGE_NUMBER_RE.is_match(line)
}

/// True when the line contains exam-type vocabulary.
pub fn has_exam_vocabulary(line: &str) -> bool {
    EXAM_VOCABULARY_RE.iter().any(|re| re.is_match(line))
}

// --- Target Year Patterns ---

/// Compiled matchers for one target year token such as "24년" or "2024학년도".
///
/// A *strong* match carries its own year suffix ("24년", "2024학년도", "'24") and
/// stands on its own. A *weak* match is a bare standalone number ("24", "2024-")
/// outside the question-number marker; it only confirms a block when an exam
/// name sits directly next to it.
#[derive(Debug, Clone)]
pub struct YearPattern {
    token: String,
    strong: Regex,
    weak: Option<Regex>,
    weak_with_exam: Option<Regex>,
}

impl YearPattern {
    pub fn compile(token: &str) -> Result<Self, ExtractError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ExtractError::Configuration("target year token is empty".to_string()));
        }

        let ascii: String = token.chars().map(to_ascii_digit).collect();
        let digits: String = ascii.chars().take_while(|c| c.is_ascii_digit()).collect();

        let (century, year) = match digits.len() {
            // Non-numeric token: match it literally, no weak form.
            0 => {
                let strong = Regex::new(&regex::escape(token))
                    .map_err(|e| ExtractError::Configuration(format!("invalid target year '{}': {}", token, e)))?;
                return Ok(Self { token: token.to_string(), strong, weak: None, weak_with_exam: None });
            }
            2 => ("20".to_string(), digits.clone()),
            4 => (digits[..2].to_string(), digits[2..].to_string()),
            n => {
                return Err(ExtractError::Configuration(format!(
                    "target year '{}' must start with a two- or four-digit year (found {} digits)",
                    token, n
                )))
            }
        };

        let wide_century = to_fullwidth(&century);
        let wide_year = to_fullwidth(&year);
        let strong_src = format!(
            r"(?:^|[^0-9０-９])(?:{c}|{wc})?(?:{y}|{wy})\s*(?:학년도|학년|년도|년)|['’‘]{y}(?:[^0-9]|$)",
            c = century,
            wc = wide_century,
            y = year,
            wy = wide_year,
        );
        let weak_src = format!(
            r"(?:^|[^0-9０-９])(?:{c})?{y}(?:$|[\s\-./·)\]])",
            c = century,
            y = year,
        );

        // Exam name directly before or after the bare number.
        let weak_with_exam_src = format!(
            r"(?:{v})\s*[:：\-]?\s*(?:{c})?{y}(?:$|[\s\-./·)\]])|(?:^|[^0-9０-９])(?:{c})?{y}\s*(?:[\-./·]\s*)?(?:{v})",
            v = EXAM_NAME_TERMS,
            c = century,
            y = year,
        );

        let compile = |src: &str| {
            Regex::new(src).map_err(|e| ExtractError::Configuration(format!("invalid target year '{}': {}", token, e)))
        };

        Ok(Self {
            token: token.to_string(),
            strong: compile(&strong_src)?,
            weak: Some(compile(&weak_src)?),
            weak_with_exam: Some(compile(&weak_with_exam_src)?),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Year token with its own suffix, anywhere on a non-page-number line.
    pub fn strong_match(&self, line: &str) -> bool {
        !is_page_number(line) && self.strong.is_match(line)
    }

    /// Bare year number on a non-page-number line, question marker excluded.
    pub fn weak_match(&self, line: &str) -> bool {
        !is_page_number(line) && self.weak.as_ref().map_or(false, |re| re.is_match(strip_numbered_marker(line)))
    }

    /// Bare year number with an exam name right next to it.
    pub fn weak_match_with_exam(&self, line: &str) -> bool {
        !is_page_number(line)
            && self
                .weak_with_exam
                .as_ref()
                .map_or(false, |re| re.is_match(strip_numbered_marker(line)))
    }

    /// Either form of the year on a non-page-number line.
    pub fn mentions(&self, line: &str) -> bool {
        self.strong_match(line) || self.weak_match(line)
    }
}

fn to_ascii_digit(c: char) -> char {
    match c {
        '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
        c => c,
    }
}

fn to_fullwidth(digits: &str) -> String {
    digits
        .chars()
        .map(|c| match c.to_digit(10) {
            Some(d) => char::from_u32('０' as u32 + d).unwrap_or(c),
            None => c,
        })
        .collect()
}

// src/extractors/tokenizer.rs

use crate::utils::error::ExtractError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// One physical line of the source document.
///
/// `text` is the normalized form used for matching; `start_offset..end_offset`
/// is the byte range of the line in the decoded source, line terminator excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Line {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Decoded source text plus its normalized line sequence.
/// Built once per request and only read afterwards.
#[derive(Debug)]
pub struct Document<'a> {
    source: &'a str,
    lines: Vec<Line>,
}

impl<'a> Document<'a> {
    pub fn parse(source: &'a str) -> Self {
        let lines = tokenize(source);
        tracing::debug!("Tokenized document into {} lines ({} bytes)", lines.len(), source.len());
        Self { source, lines }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Original text covering lines `start..=end`, whitespace and line endings untouched.
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.source[self.lines[start].start_offset..self.lines[end].end_offset]
    }
}

/// Decodes uploaded bytes into text.
///
/// UTF-8 (with or without BOM) and UTF-16 (BOM-marked, or BOM-less when the
/// NUL-byte layout gives it away) are accepted. Input that is not UTF-8 is
/// retried as CP949, the usual encoding of TXT exports from Korean word
/// processors; bytes that fail that too are a `Decoding` error.
pub fn decode_bytes(bytes: &[u8]) -> Result<String, ExtractError> {
    if bytes.starts_with(UTF8_BOM) {
        return utf8(&bytes[UTF8_BOM.len()..]);
    }
    if bytes.starts_with(UTF16_LE_BOM) {
        return utf16(&bytes[UTF16_LE_BOM.len()..], u16::from_le_bytes);
    }
    if bytes.starts_with(UTF16_BE_BOM) {
        return utf16(&bytes[UTF16_BE_BOM.len()..], u16::from_be_bytes);
    }

    // BOM-less UTF-16: ASCII units (spaces, digits, line breaks) leave a NUL on
    // one side. Hangul syllables such as U+AC00 put a few NULs on the other side,
    // so the check is a ratio rather than a clean split.
    if bytes.len() >= 2 && bytes.len() % 2 == 0 {
        let odd_nuls = bytes.iter().skip(1).step_by(2).filter(|b| **b == 0).count();
        let even_nuls = bytes.iter().step_by(2).filter(|b| **b == 0).count();
        let units = bytes.len() / 2;
        if odd_nuls * 4 > units && even_nuls * 2 < odd_nuls {
            tracing::debug!("Detected BOM-less UTF-16LE input");
            return utf16(bytes, u16::from_le_bytes);
        }
        if even_nuls * 4 > units && odd_nuls * 2 < even_nuls {
            tracing::debug!("Detected BOM-less UTF-16BE input");
            return utf16(bytes, u16::from_be_bytes);
        }
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_owned()),
        Err(e) => cp949(bytes).ok_or_else(|| {
            ExtractError::Decoding(format!(
                "not UTF-8 (invalid sequence at byte {}) and not CP949",
                e.valid_up_to()
            ))
        }),
    }
}

/// encoding_rs's EUC-KR is the WHATWG superset, i.e. CP949 / Windows-949.
fn cp949(bytes: &[u8]) -> Option<String> {
    let text = encoding_rs::EUC_KR.decode_without_bom_handling_and_without_replacement(bytes)?;
    tracing::debug!("Decoded {} bytes as CP949", bytes.len());
    Some(text.into_owned())
}

fn utf8(bytes: &[u8]) -> Result<String, ExtractError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| ExtractError::Decoding(format!("invalid UTF-8 sequence at byte {}", e.valid_up_to())))
}

fn utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Result<String, ExtractError> {
    if bytes.len() % 2 != 0 {
        return Err(ExtractError::Decoding(format!(
            "UTF-16 input has odd length ({} bytes)",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| ExtractError::Decoding(format!("invalid UTF-16: {}", e)))
}

/// Splits `source` into lines on `\n`, `\r\n` and bare `\r`.
/// A leading BOM is skipped; a trailing terminator does not produce an extra empty line.
pub fn tokenize(source: &str) -> Vec<Line> {
    let bytes = source.as_bytes();
    let mut lines = Vec::new();
    let mut start = if source.starts_with('\u{FEFF}') { '\u{FEFF}'.len_utf8() } else { 0 };
    let mut pos = start;

    let push = |lines: &mut Vec<Line>, start: usize, end: usize| {
        let index = lines.len();
        lines.push(Line {
            index,
            text: normalize(&source[start..end]),
            start_offset: start,
            end_offset: end,
        });
    };

    // '\r' and '\n' are ASCII, so byte positions here are always char boundaries.
    while pos < bytes.len() {
        match bytes[pos] {
            b'\n' => {
                push(&mut lines, start, pos);
                pos += 1;
                start = pos;
            }
            b'\r' => {
                push(&mut lines, start, pos);
                pos += if bytes.get(pos + 1) == Some(&b'\n') { 2 } else { 1 };
                start = pos;
            }
            _ => pos += 1,
        }
    }
    if start < bytes.len() {
        push(&mut lines, start, bytes.len());
    }

    lines
}

/// Normalized matching form of a line: tabs and exotic spaces become plain
/// spaces, zero-width and control characters are dropped, trailing whitespace trimmed.
fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\t' | '\u{00A0}' | '\u{3000}' | '\u{2002}'..='\u{200A}' => out.push(' '),
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' => {}
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.truncate(out.trim_end().len());
    out
}

//! Input validation: bound the text and flag suspicious number formatting.
//!
//! Text sent to a provider goes through [`TextValidator::validate`] first.
//! It never fails. It has two effects:
//!
//! 1. **Warnings** — number formatting that usually means the PDF text layer
//!    was mangled (`12 500`, `3. 14`, `seven`) is logged so a bad graph can be
//!    traced back to its source. The text itself is left untouched.
//! 2. **Truncation** — anything past `max_chars` characters is dropped.
//!    Provider request ceilings are tight relative to real documents, and
//!    truncating is the only cheap option that keeps the pipeline single-pass.

use crate::config::DEFAULT_MAX_TEXT_LENGTH;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static RE_SPLIT_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\s+\d+").unwrap());

static RE_SPLIT_DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+[,.]\s+\d+").unwrap());

static RE_NUMBER_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[zZ]ero|[oO]ne|[tT]wo|[tT]hree|[fF]our|[fF]ive|[sS]ix|[sS]even|[eE]ight|[nN]ine)\b")
        .unwrap()
});

/// Category of a suspicious number pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberIssue {
    /// Digit groups separated by whitespace, e.g. `12 500`.
    SplitDigits,
    /// A decimal split by whitespace, e.g. `3. 14` or `3, 14`.
    SplitDecimal,
    /// A number spelled out as a word, e.g. `seven`.
    NumberWord,
}

/// One suspicious match found by [`TextValidator::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberWarning {
    pub issue: NumberIssue,
    pub matched: String,
    /// Byte offset into the scanned text.
    pub position: usize,
}

/// Length bound + numeric-format checks applied before every provider call.
#[derive(Debug, Clone, Copy)]
pub struct TextValidator {
    max_chars: usize,
}

impl Default for TextValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TEXT_LENGTH)
    }
}

impl TextValidator {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Return `text` bounded to `max_chars` characters, logging every
    /// suspicious number pattern along the way.
    pub fn validate(&self, text: &str) -> String {
        for w in self.scan(text) {
            warn!(
                "Potentially malformed number detected ({:?}): '{}' at position {}",
                w.issue, w.matched, w.position
            );
        }

        match text.char_indices().nth(self.max_chars) {
            Some((cut, _)) => {
                warn!(
                    "Text length ({} chars) exceeds maximum ({}). Truncating.",
                    text.chars().count(),
                    self.max_chars
                );
                text[..cut].to_string()
            }
            None => text.to_string(),
        }
    }

    /// Find suspicious number patterns without modifying the text.
    pub fn scan(&self, text: &str) -> Vec<NumberWarning> {
        let checks: [(&Regex, NumberIssue); 3] = [
            (&RE_SPLIT_DIGITS, NumberIssue::SplitDigits),
            (&RE_SPLIT_DECIMAL, NumberIssue::SplitDecimal),
            (&RE_NUMBER_WORD, NumberIssue::NumberWord),
        ];

        checks
            .iter()
            .flat_map(|(re, issue)| {
                re.find_iter(text).map(move |m| NumberWarning {
                    issue: *issue,
                    matched: m.as_str().to_string(),
                    position: m.start(),
                })
            })
            .collect()
    }
}

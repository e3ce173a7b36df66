//! Boilerplate removal for extracted text chunks.
//!
//! A chunk survives only if it is long enough (characters and words) and its
//! trimmed, lower-cased form matches none of the boilerplate patterns:
//! legal notices, page markers, table-of-contents headers, bare number lists.

use crate::error::IngestError;
use regex::{Regex, RegexBuilder};

pub const MIN_CHARS: usize = 10;
pub const MIN_WORDS: usize = 5;

pub const BOILERPLATE_PATTERNS: [&str; 16] = [
    r"all rights reserved",
    r"provided by ihs under license",
    r"published by .*",
    r"date of issuance:.*",
    r"page \d+ of \d+",
    r"asme y14\.5.*",
    r"table of contents",
    r"annex [a-z]",
    r"mailto:.*",
    r"https?://orcid\.org/.*",
    r"this international standard was developed.*",
    r"creative commons",
    r"ccs concepts",
    r"\bfigure \d+\b",
    r"^\s*[\d\.\-]+(?:,\s*[\d\.\-]+)+\s*$",
    r"^\s*$",
];

#[derive(Debug, Clone)]
pub struct TextFilter {
    patterns: Vec<Regex>,
}

impl TextFilter {
    pub fn new() -> Result<Self, IngestError> {
        Self::with_patterns(&BOILERPLATE_PATTERNS)
    }

    pub fn with_patterns(patterns: &[&str]) -> Result<Self, IngestError> {
        let patterns = patterns
            .iter()
            .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    pub fn is_substantive(&self, chunk: &str) -> bool {
        let trimmed = chunk.trim();
        if trimmed.chars().count() < MIN_CHARS || chunk.split_whitespace().count() < MIN_WORDS {
            return false;
        }

        let lowered = trimmed.to_lowercase();
        !self.patterns.iter().any(|pattern| pattern.is_match(&lowered))
    }

    /// Keeps the substantive chunks, preserving their order.
    pub fn filter(&self, chunks: &[String]) -> Vec<String> {
        chunks
            .iter()
            .filter(|chunk| self.is_substantive(chunk))
            .cloned()
            .collect()
    }
}

use crate::models::IngestionOptions;
use std::collections::VecDeque;
use unicode_segmentation::UnicodeSegmentation;

const SEPARATOR: &str = "\n\n";
const SEPARATOR_LEN: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size.max(1),
            chunk_overlap: value.chunk_overlap.min(value.chunk_size),
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Unicode (UAX #29) sentence boundaries. Line breaks are folded first so a
/// wrapped PDF line does not end a sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    normalize_whitespace(text)
        .unicode_sentences()
        .map(normalize_whitespace)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Packs sentences into chunks of at most `chunk_size` characters joined by
/// blank lines. Consecutive chunks share trailing sentences totalling at most
/// `chunk_overlap` characters. A sentence longer than `chunk_size` is cut into
/// overlapping character windows.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let mut pieces = Vec::new();
    for sentence in split_sentences(text) {
        if sentence.chars().count() > config.chunk_size {
            pieces.extend(window_chars(&sentence, config));
        } else {
            pieces.push(sentence);
        }
    }

    merge_pieces(pieces, config)
}

fn merge_pieces(pieces: Vec<String>, config: ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: VecDeque<(String, usize)> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = piece.chars().count();
        let joined_len = |total: usize, current: &VecDeque<(String, usize)>| {
            total + len + if current.is_empty() { 0 } else { SEPARATOR_LEN }
        };

        if joined_len(total, &current) > config.chunk_size && !current.is_empty() {
            chunks.push(join(&current));

            while total > config.chunk_overlap
                || (total > 0 && joined_len(total, &current) > config.chunk_size)
            {
                let Some((_, front_len)) = current.pop_front() else {
                    break;
                };
                total -= front_len;
                if !current.is_empty() {
                    total -= SEPARATOR_LEN;
                }
            }
        }

        total = joined_len(total, &current);
        current.push_back((piece, len));
    }

    if !current.is_empty() {
        chunks.push(join(&current));
    }

    chunks
}

fn join(current: &VecDeque<(String, usize)>) -> String {
    current
        .iter()
        .map(|(piece, _)| piece.as_str())
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

fn window_chars(sentence: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    let step = config
        .chunk_size
        .saturating_sub(config.chunk_overlap)
        .max(1);

    let mut windows = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    windows
}

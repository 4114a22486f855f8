#[cfg(test)]
mod tests;

use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

pub(crate) static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n\s*").expect("valid regex"));

static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?<=[.!?])\s+").expect("valid regex"));

/// A contiguous slice of a source document, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text, trimmed and never empty
    pub text: String,
    /// Title of the document this chunk came from
    pub source_title: Option<String>,
    /// 0-based position of this chunk within its source
    pub index: usize,
}

/// How source text is cut into chunks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Paragraphs first, then sentences, then words
    #[default]
    Paragraph,
    /// Fixed character windows with a fixed overlap
    Window,
}

/// Configuration for text chunking
///
/// Sizes are measured in characters. Callers working in tokens convert with
/// their own ratio before building the config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub target_size: usize,
    /// Characters carried over from the end of one chunk into the next
    pub overlap: usize,
    pub strategy: ChunkingStrategy,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 200,
            strategy: ChunkingStrategy::Paragraph,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(RagError::Chunking(
                "target chunk size must be greater than 0".to_string(),
            ));
        }
        if self.overlap >= self.target_size {
            return Err(RagError::Chunking(format!(
                "overlap ({}) must be smaller than the target chunk size ({})",
                self.overlap, self.target_size
            )));
        }
        Ok(())
    }
}

/// A piece of text that is never split further, plus the separator that joins
/// it to the previous unit inside a chunk
#[derive(Debug, Clone, Copy)]
struct Unit<'a> {
    text: &'a str,
    joiner: &'static str,
}

/// Split text into overlapping chunks of roughly `target_size` characters
#[inline]
pub fn chunk_text(text: &str, title: Option<&str>, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let pieces = match config.strategy {
        ChunkingStrategy::Paragraph => {
            let units = split_units(text, config.target_size);
            accumulate(&units, config)
        }
        ChunkingStrategy::Window => window_chunks(text, config),
    };

    let chunks: Vec<Chunk> = pieces
        .iter()
        .map(|piece| piece.trim())
        .filter(|piece| !piece.is_empty())
        .enumerate()
        .map(|(index, piece)| Chunk {
            text: piece.to_string(),
            source_title: title.map(ToString::to_string),
            index,
        })
        .collect();

    debug!(
        "Chunked '{}' ({} chars) into {} chunks",
        title.unwrap_or("<untitled>"),
        char_len(text),
        chunks.len()
    );

    Ok(chunks)
}

/// Break text into units no longer than `target` characters, preferring
/// paragraph, then sentence, then word boundaries
fn split_units(text: &str, target: usize) -> Vec<Unit<'_>> {
    let mut units = Vec::new();

    for paragraph in split_on(&PARAGRAPH_BREAK, text) {
        if char_len(paragraph) <= target {
            units.push(Unit {
                text: paragraph,
                joiner: "\n\n",
            });
            continue;
        }

        let mut joiner = "\n\n";
        for sentence in split_on(&SENTENCE_BOUNDARY, paragraph) {
            if char_len(sentence) <= target {
                units.push(Unit {
                    text: sentence,
                    joiner,
                });
                joiner = " ";
                continue;
            }

            for word in sentence.split_whitespace() {
                if char_len(word) <= target {
                    units.push(Unit { text: word, joiner });
                    joiner = " ";
                    continue;
                }

                for window in char_windows(word, target) {
                    units.push(Unit {
                        text: window,
                        joiner,
                    });
                    joiner = "";
                }
                joiner = " ";
            }
        }
    }

    units
}

/// Accumulate units into chunks, seeding each new chunk with the tail of the
/// previous one
fn accumulate(units: &[Unit<'_>], config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0;

    for unit in units {
        let unit_len = char_len(unit.text);

        if buffer_len > 0 && buffer_len + unit_len >= config.target_size {
            let tail = overlap_tail(&buffer, config.overlap);
            chunks.push(std::mem::take(&mut buffer));
            buffer_len = 0;

            if !tail.is_empty() {
                buffer_len = char_len(&tail);
                buffer = tail;
            }
        }

        if buffer_len > 0 {
            buffer.push_str(unit.joiner);
            buffer_len += char_len(unit.joiner);
        }
        buffer.push_str(unit.text);
        buffer_len += unit_len;
    }

    if !buffer.trim().is_empty() {
        chunks.push(buffer);
    }

    chunks
}

/// Fixed-size character windows advancing by `target_size - overlap`
fn window_chunks(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = config.target_size - config.overlap;
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.target_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    windows
}

/// The trailing `overlap` characters of a closed chunk, moved forward to the
/// next word boundary when the cut lands inside a word
fn overlap_tail(text: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }

    let chars: Vec<char> = text.trim_end().chars().collect();
    let start = chars.len().saturating_sub(overlap);
    let tail = &chars[start..];

    let cuts_word = start > 0 && !chars[start - 1].is_whitespace();
    let skip = if cuts_word {
        tail.iter().position(|c| c.is_whitespace()).unwrap_or(0)
    } else {
        0
    };

    tail[skip..].iter().collect::<String>().trim_start().to_string()
}

pub(crate) fn split_on<'a>(pattern: &Regex, text: &'a str) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for found in pattern.find_iter(text).flatten() {
        if let Some(piece) = text.get(start..found.start()) {
            pieces.push(piece);
        }
        start = found.end();
    }
    if let Some(rest) = text.get(start..) {
        pieces.push(rest);
    }

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn char_windows(word: &str, size: usize) -> Vec<&str> {
    let boundaries: Vec<usize> = word
        .char_indices()
        .map(|(offset, _)| offset)
        .step_by(size)
        .chain(std::iter::once(word.len()))
        .collect();

    boundaries
        .windows(2)
        .filter_map(|bounds| word.get(bounds[0]..bounds[1]))
        .collect()
}

/// Length in Unicode scalar values
#[inline]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

//! Built-in content chunkers.
//!
//! Detectors see text in chunks; each chunk remembers its character offset
//! so detection spans can be mapped back onto the original message.

use crate::config::schema::DEFAULT_CHUNKER_ID;

pub const SENTENCE_CHUNKER_ID: &str = "sentence_chunker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunker {
    /// The whole text as a single chunk.
    WholeDoc,
    /// One chunk per sentence, split after `.`, `!` or `?` followed by whitespace.
    Sentence,
}

/// A slice of the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Character offset of the chunk within the original text.
    pub offset: usize,
    pub text: String,
}

impl Chunker {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            DEFAULT_CHUNKER_ID => Some(Chunker::WholeDoc),
            SENTENCE_CHUNKER_ID => Some(Chunker::Sentence),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Chunker::WholeDoc => DEFAULT_CHUNKER_ID,
            Chunker::Sentence => SENTENCE_CHUNKER_ID,
        }
    }

    /// Split `text`. Blank text yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        match self {
            Chunker::WholeDoc => vec![Chunk {
                offset: 0,
                text: text.to_string(),
            }],
            Chunker::Sentence => sentences(text),
        }
    }
}

fn sentences(text: &str) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start: Option<usize> = None;
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if start.is_none() {
            if c.is_whitespace() {
                continue;
            }
            start = Some(i);
        }
        current.push(c);

        let terminal = matches!(c, '.' | '!' | '?');
        let at_boundary = chars.get(i + 1).map_or(true, |next| next.is_whitespace());
        if terminal && at_boundary {
            if let Some(offset) = start.take() {
                chunks.push(Chunk {
                    offset,
                    text: std::mem::take(&mut current),
                });
            }
        }
    }

    if let Some(offset) = start {
        chunks.push(Chunk {
            offset,
            text: current.trim_end().to_string(),
        });
    }
    chunks
}

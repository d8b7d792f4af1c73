use crate::config::ExtractionSettings;

/// A window of words cut from a longer document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position of the chunk in its document
    pub index: usize,
    pub text: String,
    /// Word index of the first token
    pub start: usize,
    /// Word index after the last token
    pub end: usize,
    /// Document label (file name, etc.)
    pub source: String,
}

impl Chunk {
    /// Provenance label attached to triples extracted from this chunk.
    pub fn source_ref(&self) -> String {
        format!("chunk:{}", self.index)
    }
}

/// Word chunker with overlap between consecutive windows.
#[derive(Debug, Clone)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self {
            size: size.max(1),
            overlap: overlap.min(size.saturating_sub(1)),
        }
    }

    pub fn from_settings(settings: &ExtractionSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    /// Split text into overlapping word windows.
    pub fn chunk(&self, text: &str, source: impl Into<String>) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let step = self.size.saturating_sub(self.overlap).max(1);
        let source = source.into();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < words.len() {
            let end = (start + self.size).min(words.len());
            chunks.push(Chunk {
                index: chunks.len(),
                text: words[start..end].join(" "),
                start,
                end,
                source: source.clone(),
            });

            if end == words.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

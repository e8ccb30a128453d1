//! Sentence-aware fixed-size splitter that turns a text corpus into passages.

use crc32fast::Hasher as Crc32;

use crate::embeddings::{passage_id, Passage};

/// Tunables for passage construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Upper bound on tokens per passage.
    pub chunk_target_tokens: usize,
    /// Tokens of trailing context repeated at the start of the next passage.
    pub chunk_overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_target_tokens: 256,
            chunk_overlap_tokens: 20,
        }
    }
}

/// Splits text into overlapping passages on sentence boundaries.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    tokens: usize,
}

impl Chunker {
    /// Builds a chunker with the provided configuration.
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Splits `text` into passages labelled with `source`.
    ///
    /// Passage text is sliced straight from the input, so paragraph breaks
    /// inside a passage survive and byte offsets always index into `text`.
    pub fn split(&self, source: &str, text: &str) -> Vec<Passage> {
        let target = self.config.chunk_target_tokens.max(1);
        let overlap = self
            .config
            .chunk_overlap_tokens
            .min(target.saturating_sub(1));

        let mut spans = Vec::new();
        for (start, end) in paragraphs(text) {
            for sentence in sentences(text, start, end) {
                if sentence.tokens > target {
                    spans.extend(split_long(text, sentence, target));
                } else {
                    spans.push(sentence);
                }
            }
        }

        let mut passages = Vec::new();
        let mut buffer: Vec<Span> = Vec::new();
        let mut token_total = 0usize;
        for span in spans {
            if !buffer.is_empty() && token_total + span.tokens > target {
                flush(&mut passages, source, text, &buffer);
                buffer = retain_overlap(&buffer, overlap);
                token_total = buffer.iter().map(|s| s.tokens).sum();
                if token_total + span.tokens > target {
                    buffer.clear();
                    token_total = 0;
                }
            }
            token_total += span.tokens;
            buffer.push(span);
        }
        if !buffer.is_empty() {
            flush(&mut passages, source, text, &buffer);
        }
        passages
    }
}

/// Whitespace token estimate, never zero.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count().max(1)
}

fn paragraphs(text: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut offset = 0usize;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim_end();
        if trimmed.trim_start().is_empty() {
            if let Some(para) = current.take() {
                out.push(para);
            }
            continue;
        }
        let lead = trimmed.len() - trimmed.trim_start().len();
        let end = line_start + trimmed.len();
        match current.as_mut() {
            Some(para) => para.1 = end,
            None => current = Some((line_start + lead, end)),
        }
    }
    if let Some(para) = current {
        out.push(para);
    }
    out
}

fn sentences(text: &str, start: usize, end: usize) -> Vec<Span> {
    let body = &text[start..end];
    let mut out = Vec::new();
    let mut sentence_start: Option<usize> = None;
    let mut chars = body.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if sentence_start.is_none() {
            if ch.is_whitespace() {
                continue;
            }
            sentence_start = Some(idx);
        }
        if matches!(ch, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
            if at_boundary {
                if let Some(s) = sentence_start.take() {
                    out.push(span(text, start + s, start + idx + ch.len_utf8()));
                }
            }
        }
    }
    if let Some(s) = sentence_start {
        out.push(span(text, start + s, end));
    }
    out
}

fn span(text: &str, start: usize, end: usize) -> Span {
    Span {
        start,
        end,
        tokens: estimate_tokens(&text[start..end]),
    }
}

fn split_long(text: &str, sentence: Span, target: usize) -> Vec<Span> {
    let mut words = Vec::new();
    let mut word_start: Option<usize> = None;
    for (idx, ch) in text[sentence.start..sentence.end].char_indices() {
        let abs = sentence.start + idx;
        match (ch.is_whitespace(), word_start) {
            (true, Some(s)) => {
                words.push((s, abs));
                word_start = None;
            }
            (false, None) => word_start = Some(abs),
            _ => {}
        }
    }
    if let Some(s) = word_start {
        words.push((s, sentence.end));
    }
    words
        .chunks(target)
        .filter_map(|group| {
            let first = group.first()?;
            let last = group.last()?;
            Some(Span {
                start: first.0,
                end: last.1,
                tokens: group.len(),
            })
        })
        .collect()
}

fn retain_overlap(buffer: &[Span], overlap: usize) -> Vec<Span> {
    if overlap == 0 {
        return Vec::new();
    }
    let mut retained = Vec::new();
    let mut tokens = 0usize;
    for span in buffer.iter().rev() {
        if tokens + span.tokens > overlap {
            break;
        }
        tokens += span.tokens;
        retained.push(*span);
    }
    // never carry the whole buffer forward, or the next passage would restart at the same offset
    if retained.len() == buffer.len() {
        retained.pop();
    }
    retained.reverse();
    retained
}

fn flush(passages: &mut Vec<Passage>, source: &str, text: &str, buffer: &[Span]) {
    let (Some(first), Some(last)) = (buffer.first(), buffer.last()) else {
        return;
    };
    let body = &text[first.start..last.end];
    let mut hasher = Crc32::new();
    hasher.update(body.as_bytes());
    passages.push(Passage {
        id: passage_id(source, first.start),
        source: source.to_string(),
        chunk_index: passages.len(),
        text: body.to_string(),
        byte_start: first.start,
        byte_end: last.end,
        token_estimate: buffer.iter().map(|s| s.tokens).sum(),
        checksum: hasher.finalize(),
    });
}

//! Recursive-separator text chunker with character overlap.
//!
//! Splits a [`Document`] into [`Chunk`]s no longer than `max_chars`
//! characters, preferring the most significant separator that occurs in
//! the text (paragraph break, then line break, then sentence end, then
//! space, then arbitrary character).
//!
//! # Algorithm
//!
//! 1. **Atomize.** If a span fits in `max_chars - overlap_chars`, it is kept
//!    whole. Otherwise it is cut on the first separator from the preference
//!    list that occurs in it, and each piece is processed again with the
//!    remaining (less significant) separators. The empty separator `""`
//!    means "cut between any two characters". When no separator applies,
//!    the span is kept whole even though it is oversized.
//! 2. **Merge.** Consecutive pieces are packed greedily into chunks of at
//!    most `max_chars` characters. Every chunk after the first starts
//!    `overlap_chars` characters before the end of the previous chunk.
//!
//! # Boundary policy
//!
//! A separator stays attached to the piece on its left, so chunk spans are
//! exact, contiguous slices of the document. The span is what
//! [`Chunk::span`] returns; the indexed [`Chunk::text`] is that span with
//! surrounding whitespace trimmed. With `max_chars = 4`, `overlap_chars = 0`
//! and separators `[". "]`, `"A. B. C."` yields spans `"A. "`, `"B. "`,
//! `"C."` and texts `"A."`, `"B."`, `"C."`.
//!
//! Dropping the first [`Chunk::overlap`] characters of every span and
//! concatenating the rest reproduces the document. `overlap` equals
//! `overlap_chars` except when fewer characters precede the chunk.
//!
//! A span that is entirely whitespace is not emitted on its own. It is
//! folded into the previous chunk's span, or into the first chunk's span
//! when it leads the document, so reconstruction stays exact. Such a
//! chunk's span can exceed `max_chars` by that whitespace while its text
//! does not. A blank document produces no chunks.
//!
//! All lengths are counted in Unicode scalar values, never bytes.

use sha2::{Digest, Sha256};

use crate::models::{Chunk, Document};

/// Chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkParams {
    pub max_chars: usize,
    pub overlap_chars: usize,
    /// Separators in decreasing order of significance.
    pub separators: Vec<String>,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap_chars: 200,
            separators: default_separators(),
        }
    }
}

/// `["\n\n", "\n", ". ", " ", ""]`
pub fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ". ", " ", ""]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// A chunk span before it is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    overlap: usize,
}

/// Iterator over the chunks of one document.
///
/// Span boundaries are computed up front; chunk text, ids, and hashes are
/// only built as the iterator is advanced.
pub struct Chunks<'a> {
    document: &'a Document,
    spans: std::vec::IntoIter<Span>,
    position: usize,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let span = self.spans.next()?;
        let text = self.document.text[span.start..span.end].trim();
        let chunk = make_chunk(self.document, self.position, span, text);
        self.position += 1;
        Some(chunk)
    }
}

/// Split a document into chunks.
///
/// `overlap_chars` must be smaller than `max_chars`; larger values are
/// clamped to `max_chars - 1`.
pub fn chunk_document<'a>(document: &'a Document, params: &ChunkParams) -> Chunks<'a> {
    let spans = split_spans(&document.text, params);
    Chunks {
        document,
        spans: spans.into_iter(),
        position: 0,
    }
}

/// Chunk a batch of documents, preserving document order.
pub fn chunk_documents(documents: &[Document], params: &ChunkParams) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|d| chunk_document(d, params))
        .collect()
}

fn split_spans(text: &str, params: &ChunkParams) -> Vec<Span> {
    if text.is_empty() {
        return Vec::new();
    }
    let max = params.max_chars.max(1);
    let overlap = params.overlap_chars.min(max - 1);

    let mut pieces = Vec::new();
    atomize(
        text,
        0,
        text.len(),
        &params.separators,
        max - overlap,
        &mut pieces,
    );
    fold_blank(text, merge(text, &pieces, max, overlap))
}

/// Cut `text[start..end]` into pieces of at most `limit` characters where
/// the separators allow it.
fn atomize(
    text: &str,
    start: usize,
    end: usize,
    separators: &[String],
    limit: usize,
    out: &mut Vec<(usize, usize)>,
) {
    let slice = &text[start..end];
    if char_len(slice) <= limit {
        out.push((start, end));
        return;
    }

    let Some(i) = separators
        .iter()
        .position(|s| s.is_empty() || slice.contains(s.as_str()))
    else {
        // Indivisible: emitted oversized.
        out.push((start, end));
        return;
    };
    let sep = separators[i].as_str();
    let rest = &separators[i + 1..];

    if sep.is_empty() {
        let mut piece_start = start;
        let mut count = 0;
        for (offset, _) in slice.char_indices() {
            if count == limit {
                out.push((piece_start, start + offset));
                piece_start = start + offset;
                count = 0;
            }
            count += 1;
        }
        out.push((piece_start, end));
        return;
    }

    let mut piece_start = start;
    for (offset, matched) in slice.match_indices(sep) {
        let piece_end = start + offset + matched.len();
        atomize(text, piece_start, piece_end, rest, limit, out);
        piece_start = piece_end;
    }
    if piece_start < end {
        atomize(text, piece_start, end, rest, limit, out);
    }
}

/// Pack contiguous pieces into spans of at most `max` characters.
fn merge(text: &str, pieces: &[(usize, usize)], max: usize, overlap: usize) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    let mut current: Option<(Span, usize)> = None;

    for &(start, end) in pieces {
        let piece_len = char_len(&text[start..end]);

        if let Some((span, len)) = current.as_mut() {
            if *len + piece_len <= max {
                span.end = end;
                *len += piece_len;
                continue;
            }
            spans.push(*span);
        }

        current = Some(if spans.is_empty() {
            (
                Span {
                    start,
                    end,
                    overlap: 0,
                },
                piece_len,
            )
        } else {
            let (overlap_start, shared) = back_off(text, start, overlap);
            (
                Span {
                    start: overlap_start,
                    end,
                    overlap: shared,
                },
                shared + piece_len,
            )
        });
    }

    if let Some((span, _)) = current {
        spans.push(span);
    }
    spans
}

/// Fold whitespace-only spans into a neighbour so the remaining spans still
/// tile the document.
fn fold_blank(text: &str, spans: Vec<Span>) -> Vec<Span> {
    let mut out: Vec<Span> = Vec::with_capacity(spans.len());
    let mut leading: Option<usize> = None;
    for mut span in spans {
        if text[span.start..span.end].trim().is_empty() {
            match out.last_mut() {
                Some(prev) => prev.end = span.end,
                None => {
                    leading.get_or_insert(span.start);
                }
            }
            continue;
        }
        if let Some(start) = leading.take() {
            span.start = start;
            span.overlap = 0;
        }
        out.push(span);
    }
    out
}

/// Step back up to `n` characters from byte offset `at`.
///
/// Returns the new byte offset and the number of characters stepped over.
fn back_off(text: &str, at: usize, n: usize) -> (usize, usize) {
    let mut offset = at;
    let mut taken = 0;
    for (i, _) in text[..at].char_indices().rev() {
        if taken == n {
            break;
        }
        offset = i;
        taken += 1;
    }
    (offset, taken)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(document: &Document, position: usize, span: Span, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}#{}", document.source, position),
        source: document.source.clone(),
        position,
        start: span.start,
        end: span.end,
        overlap: span.overlap,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max: usize, overlap: usize, seps: &[&str]) -> ChunkParams {
        ChunkParams {
            max_chars: max,
            overlap_chars: overlap,
            separators: seps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn reconstruct(doc: &Document, chunks: &[Chunk]) -> String {
        chunks
            .iter()
            .flat_map(|c| c.span(doc).chars().skip(c.overlap))
            .collect()
    }

    const PROSE: &str = "Hogwarts rules are strict. Students must be in their dormitories by nine.\n\
        First years may not keep dragons.\n\nOwls are allowed. Cats are allowed. Toads are allowed.\n\
        The Forbidden Forest is forbidden to all students.\n\nCurfew is enforced by the prefects, \
        who patrol the corridors every night without exception.";

    #[test]
    fn test_sentence_fixture() {
        let doc = Document::new("rules.txt", "A. B. C.");
        let chunks: Vec<Chunk> = chunk_document(&doc, &params(4, 0, &[". "])).collect();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["A.", "B.", "C."]);
        let spans: Vec<&str> = chunks.iter().map(|c| c.span(&doc)).collect();
        assert_eq!(spans, vec!["A. ", "B. ", "C."]);
    }

    #[test]
    fn test_small_text_single_chunk() {
        let doc = Document::new("a", "Hello, world!");
        let chunks: Vec<Chunk> = chunk_document(&doc, &ChunkParams::default()).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].overlap, 0);
    }

    #[test]
    fn test_blank_document_has_no_chunks() {
        let p = ChunkParams::default();
        assert_eq!(chunk_document(&Document::new("a", ""), &p).count(), 0);
        assert_eq!(chunk_document(&Document::new("a", "  \n\n "), &p).count(), 0);
    }

    #[test]
    fn test_reconstruction_with_overlap() {
        let doc = Document::new("rules.txt", PROSE);
        let chunks: Vec<Chunk> = chunk_document(&doc, &params(60, 15, &["\n\n", "\n", ". ", " ", ""])).collect();
        assert!(chunks.len() > 3);
        assert_eq!(reconstruct(&doc, &chunks), PROSE);
        assert_eq!(chunks[0].overlap, 0);
        for c in &chunks[1..] {
            assert_eq!(c.overlap, 15);
        }
    }

    #[test]
    fn test_blank_runs_fold_into_neighbours() {
        let text = "aa\n\n\n\n\n\n\n\nbb";
        let doc = Document::new("gaps.txt", text);
        for overlap in [0, 1] {
            let chunks: Vec<Chunk> = chunk_document(&doc, &params(4, overlap, &["\n", ""])).collect();
            let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(texts, vec!["aa", "bb"], "overlap {}", overlap);
            assert_eq!(reconstruct(&doc, &chunks), text, "overlap {}", overlap);
            assert_eq!(chunks[1].position, 1);
        }

        let text = "\n\n\n\n\n\nzz";
        let doc = Document::new("lead.txt", text);
        let chunks: Vec<Chunk> = chunk_document(&doc, &params(4, 0, &["\n", ""])).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].overlap, 0);
        assert_eq!(chunks[0].text, "zz");
        assert_eq!(reconstruct(&doc, &chunks), text);
    }

    #[test]
    fn test_reconstruction_without_overlap() {
        let doc = Document::new("rules.txt", PROSE);
        let chunks: Vec<Chunk> = chunk_document(&doc, &params(50, 0, &["\n\n", "\n", ". ", " "])).collect();
        assert_eq!(reconstruct(&doc, &chunks), PROSE);
    }

    #[test]
    fn test_max_length_respected() {
        let doc = Document::new("rules.txt", PROSE);
        for (max, overlap) in [(30, 0), (40, 10), (80, 20), (200, 50)] {
            let chunks: Vec<Chunk> = chunk_document(&doc, &ChunkParams {
                max_chars: max,
                overlap_chars: overlap,
                separators: default_separators(),
            })
            .collect();
            for c in &chunks {
                assert!(
                    c.span(&doc).chars().count() <= max,
                    "chunk {} exceeds {} chars",
                    c.position,
                    max
                );
            }
        }
    }

    #[test]
    fn test_oversized_word_kept_whole() {
        let text = "tiny supercalifragilisticexpialidocious end";
        let doc = Document::new("a", text);
        let chunks: Vec<Chunk> = chunk_document(&doc, &params(10, 0, &["\n\n", " "])).collect();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["tiny", "supercalifragilisticexpialidocious", "end"]);
        assert_eq!(reconstruct(&doc, &chunks), text);
    }

    #[test]
    fn test_character_fallback_splits_long_word() {
        let doc = Document::new("a", "abcdefghij");
        let chunks: Vec<Chunk> = chunk_document(&doc, &params(4, 0, &[" ", ""])).collect();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_paragraphs_preferred() {
        let text = "First paragraph here.\n\nSecond paragraph here.";
        let doc = Document::new("a", text);
        let chunks: Vec<Chunk> = chunk_document(&doc, &params(30, 0, &["\n\n", "\n", ". ", " ", ""])).collect();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn test_positions_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let doc = Document::new("doc1", text);
        let chunks: Vec<Chunk> = chunk_document(&doc, &params(40, 8, &["\n\n", " ", ""])).collect();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.position, i, "position mismatch at {}", i);
            assert_eq!(c.id, format!("doc1#{}", i));
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Héllo wörld      │\n└──────────────────┘";
        let doc = Document::new("box", text);
        let chunks: Vec<Chunk> = chunk_document(&doc, &params(7, 2, &["\n", " ", ""])).collect();
        assert!(!chunks.is_empty());
        assert_eq!(reconstruct(&doc, &chunks), text);
        for c in &chunks {
            assert!(c.span(&doc).chars().count() <= 7);
        }
    }

    #[test]
    fn test_deterministic() {
        let doc = Document::new("doc1", PROSE);
        let p = params(45, 5, &["\n\n", "\n", ". ", " ", ""]);
        let c1: Vec<Chunk> = chunk_document(&doc, &p).collect();
        let c2: Vec<Chunk> = chunk_document(&doc, &p).collect();
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_chunk_documents_keeps_order() {
        let docs = vec![
            Document::new("a.md", "alpha"),
            Document::new("b.md", "beta"),
        ];
        let chunks = chunk_documents(&docs, &ChunkParams::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, "a.md");
        assert_eq!(chunks[1].source, "b.md");
    }
}

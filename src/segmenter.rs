//! # Segmenter
//!
//! Splits document text into an ordered sequence of bounded [`Chunk`]s.
//!
//! Two strategies are available (see [`SegmentationStrategy`]):
//!
//! - **Flat**: the whole text is split recursively on the separators `"\n\n"`, `"\n"`, `". "`,
//!   `" "` and finally `""` (single characters). Pieces shorter than `chunk_size` are merged
//!   greedily into windows of at most `chunk_size` characters, and consecutive windows share at
//!   most `chunk_overlap` characters. Separators stay attached to the end of the piece they
//!   terminate. Chunks are whitespace-trimmed and empty chunks are dropped.
//! - **Headings**: lines are classified as headings or body with [`is_heading`]. Body lines
//!   are grouped under the most recent heading, each section is split flat, and every
//!   sub-chunk carries the section heading (text before the first heading uses
//!   [`ROOT_HEADING`]). Non-root chunks have the heading prepended to their text so the
//!   embedding sees it.
//!
//! Lengths are counted in Unicode scalar values, not bytes.
//!
//! ```rust
//! use awful_rag::segmenter::{Segmenter, SegmentationStrategy};
//!
//! let segmenter = Segmenter::new(500, 100, SegmentationStrategy::Headings).unwrap();
//! let chunks = segmenter.segment("INTRO\nHello world.\n\nSECTION ONE\nThe cat sat on the mat.");
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].heading.as_deref(), Some("SECTION ONE"));
//! ```

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

/// Heading given to content that precedes any detected heading.
pub const ROOT_HEADING: &str = " ";

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Paragraph, line, sentence, word, character.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

static HEADING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Z][A-Z0-9 ]{2,}|\d+(?:\.\d+)*\.?\s+[A-Z].*)$")
        .expect("heading pattern is a valid regex")
});

/// A bounded span of document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Section heading, [`ROOT_HEADING`] before the first heading, `None` for flat splitting.
    pub heading: Option<String>,
    /// Chunk text. Includes the heading line for non-root heading-aware chunks.
    pub text: String,
    /// Position of the chunk in document order, starting at 0.
    pub sequence_index: usize,
}

impl Chunk {
    /// The chunk text without the duplicated heading line.
    pub fn body(&self) -> &str {
        match self.heading.as_deref() {
            Some(heading) if heading != ROOT_HEADING => self
                .text
                .strip_prefix(heading)
                .and_then(|rest| rest.strip_prefix('\n'))
                .unwrap_or(&self.text),
            _ => &self.text,
        }
    }
}

/// Which splitting algorithm [`Segmenter::segment`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationStrategy {
    #[default]
    Flat,
    Headings,
}

/// Configured text splitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmenter {
    chunk_size: usize,
    chunk_overlap: usize,
    strategy: SegmentationStrategy,
}

/// Lines grouped under one heading.
struct Section {
    heading: String,
    body: String,
}

/// Does `line` look like a section heading?
///
/// A trimmed line qualifies when it is made of uppercase words (at least three characters,
/// starting with a letter) or when it starts with a numbered prefix such as `3.` or `2.1`
/// followed by a capitalized word.
pub fn is_heading(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && HEADING_PATTERN.is_match(line)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_trimmed(chunks: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split `text` after every occurrence of `separator`; an empty separator yields characters.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        text.char_indices()
            .map(|(start, c)| &text[start..start + c.len_utf8()])
            .collect()
    } else {
        text.split_inclusive(separator).collect()
    }
}

fn split_sections(text: &str) -> Vec<Section> {
    let mut sections = vec![Section {
        heading: ROOT_HEADING.to_string(),
        body: String::new(),
    }];

    for line in text.lines() {
        if is_heading(line) {
            sections.push(Section {
                heading: line.trim().to_string(),
                body: String::new(),
            });
        } else if let Some(section) = sections.last_mut() {
            section.body.push_str(line);
            section.body.push('\n');
        }
    }

    sections
}

impl Segmenter {
    /// Create a segmenter.
    ///
    /// # Errors
    /// [`RagError::Segmentation`] when `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        strategy: SegmentationStrategy,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Segmentation(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Segmentation(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            strategy,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn strategy(&self) -> SegmentationStrategy {
        self.strategy
    }

    /// Split `text` into chunks using the configured strategy.
    ///
    /// Empty or whitespace-only input yields no chunks.
    pub fn segment(&self, text: &str) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = match self.strategy {
            SegmentationStrategy::Flat => self
                .split_text(text)
                .into_iter()
                .enumerate()
                .map(|(sequence_index, text)| Chunk {
                    heading: None,
                    text,
                    sequence_index,
                })
                .collect(),
            SegmentationStrategy::Headings => {
                let mut chunks = Vec::new();
                for section in split_sections(text) {
                    for body in self.split_text(&section.body) {
                        let text = if section.heading == ROOT_HEADING {
                            body
                        } else {
                            format!("{}\n{}", section.heading, body)
                        };
                        chunks.push(Chunk {
                            heading: Some(section.heading.clone()),
                            text,
                            sequence_index: chunks.len(),
                        });
                    }
                }
                chunks
            }
        };

        debug!(
            "Segmented {} characters into {} chunks ({:?}, size {}, overlap {})",
            char_len(text),
            chunks.len(),
            self.strategy,
            self.chunk_size,
            self.chunk_overlap
        );

        chunks
    }

    /// Flat recursive splitting of `text` into trimmed pieces of at most `chunk_size` chars.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|separator| separator.is_empty() || text.contains(separator))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                push_trimmed(&mut chunks, piece);
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    /// Greedily pack small pieces into windows, carrying at most `chunk_overlap` characters
    /// from the end of one window into the next.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window.iter().copied().collect::<String>());

                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        if !window.is_empty() {
            push_trimmed(&mut chunks, &window.iter().copied().collect::<String>());
        }

        chunks
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            strategy: SegmentationStrategy::Flat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(chunk_size: usize, chunk_overlap: usize) -> Segmenter {
        Segmenter::new(chunk_size, chunk_overlap, SegmentationStrategy::Flat).unwrap()
    }

    fn headings(chunk_size: usize, chunk_overlap: usize) -> Segmenter {
        Segmenter::new(chunk_size, chunk_overlap, SegmentationStrategy::Headings).unwrap()
    }

    /// Longest suffix of `a` that is also a prefix of `b`, in characters.
    fn overlap_len(a: &str, b: &str) -> usize {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        (1..=a.len().min(b.len()))
            .rev()
            .find(|&k| a[a.len() - k..] == b[..k])
            .unwrap_or(0)
    }

    fn strip_whitespace(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn sample_document() -> String {
        let mut text = String::new();
        for paragraph in 0..12 {
            for sentence in 0..(3 + paragraph % 4) {
                text.push_str(&format!(
                    "Paragraph {paragraph} sentence {sentence} talks about vectors and indexes. "
                ));
            }
            text.push_str("\n\n");
        }
        text
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(flat(100, 10).segment("").is_empty());
        assert!(flat(100, 10).segment("  \n\n \t").is_empty());
        assert!(headings(100, 10).segment("").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = flat(100, 10).segment("  Hello world.  ");
        assert_eq!(
            chunks,
            vec![Chunk {
                heading: None,
                text: "Hello world.".to_string(),
                sequence_index: 0,
            }]
        );
    }

    #[test]
    fn chunks_respect_size_and_overlap_bounds() {
        let text = sample_document();
        for (size, overlap) in [(40, 0), (60, 10), (100, 30), (250, 100), (500, 100)] {
            let chunks = flat(size, overlap).split_text(&text);
            assert!(chunks.len() > 1, "expected several chunks for size {size}");
            for chunk in &chunks {
                assert!(
                    char_len(chunk) <= size,
                    "chunk of {} chars exceeds {size}",
                    char_len(chunk)
                );
            }
            for pair in chunks.windows(2) {
                assert!(overlap_len(&pair[0], &pair[1]) <= overlap);
            }
        }
    }

    #[test]
    fn without_overlap_no_content_is_dropped_or_repeated() {
        let text = sample_document();
        for size in [7, 40, 120, 500] {
            let joined: String = flat(size, 0).split_text(&text).concat();
            assert_eq!(strip_whitespace(&joined), strip_whitespace(&text));
        }
    }

    #[test]
    fn overlapping_chunks_cover_the_source_in_order() {
        let mut text = String::new();
        for i in 0..420 {
            text.push_str(&format!("w{i:03}"));
            text.push_str(match i % 35 {
                34 => ".\n\n",
                n if n % 7 == 6 => ". ",
                _ => " ",
            });
        }
        let content = text.trim_end();

        for (size, overlap) in [(40, 15), (60, 10), (100, 30), (250, 100), (500, 100)] {
            let chunks = flat(size, overlap).split_text(&text);
            let spans: Vec<(usize, usize)> = chunks
                .iter()
                .map(|chunk| {
                    let start = text.find(chunk.as_str()).unwrap();
                    (start, start + chunk.len())
                })
                .collect();

            assert_eq!(spans[0].0, 0, "size {size}: first chunk skips text");
            assert_eq!(
                spans[spans.len() - 1].1,
                content.len(),
                "size {size}: last chunk stops early"
            );
            for pair in spans.windows(2) {
                let ((prev_start, prev_end), (start, end)) = (pair[0], pair[1]);
                assert!(start > prev_start && end > prev_end, "size {size}: out of order");
                if start > prev_end {
                    assert!(
                        text[prev_end..start].trim().is_empty(),
                        "size {size}: {:?} was dropped",
                        &text[prev_end..start]
                    );
                } else {
                    assert!(prev_end - start <= overlap, "size {size}: overlap too long");
                }
            }
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text: String = (0..60).map(|i| format!("word{i:03} ")).collect();
        let chunks = flat(50, 20).split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let shared = overlap_len(&pair[0], &pair[1]);
            assert!(shared > 0, "{:?} and {:?} share nothing", pair[0], pair[1]);
            assert!(shared <= 20);
        }
        assert_eq!(chunks[0], "word000 word001 word002 word003 word004 word005");
        assert!(chunks[1].starts_with("word004 word005 word006"));
    }

    #[test]
    fn paragraphs_are_preferred_split_points() {
        let text = "First paragraph is here.\n\nSecond paragraph is here.";
        let chunks = flat(30, 0).split_text(text);
        assert_eq!(
            chunks,
            vec!["First paragraph is here.", "Second paragraph is here."]
        );
    }

    #[test]
    fn sentences_keep_their_terminator() {
        let text = "The cat sat. The dog ran off. A bird sang loudly.";
        let chunks = flat(20, 0).split_text(text);
        assert_eq!(
            chunks,
            vec!["The cat sat.", "The dog ran off.", "A bird sang loudly."]
        );
    }

    #[test]
    fn unbroken_text_falls_back_to_character_cuts() {
        let chunks = flat(10, 0).split_text(&"a".repeat(30));
        assert_eq!(chunks, vec!["a".repeat(10); 3]);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let chunks = flat(10, 0).split_text(&"é".repeat(20));
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() == 10));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(matches!(
            Segmenter::new(0, 0, SegmentationStrategy::Flat),
            Err(RagError::Segmentation(_))
        ));
        assert!(matches!(
            Segmenter::new(100, 100, SegmentationStrategy::Flat),
            Err(RagError::Segmentation(_))
        ));
        assert!(Segmenter::new(100, 99, SegmentationStrategy::Headings).is_ok());
    }

    #[test]
    fn heading_heuristic() {
        for heading in [
            "INTRO",
            "SECTION ONE",
            "  RISKS  ",
            "APPENDIX B",
            "1. Introduction",
            "3.2 Risks and mitigations",
            "12 Results",
        ] {
            assert!(is_heading(heading), "{heading:?} should be a heading");
        }
        for body in [
            "",
            "AB",
            "Hello world.",
            "Section 3: Risks",
            "2. lowercase start",
            "INTRO.",
            "The cat sat on the mat.",
        ] {
            assert!(!is_heading(body), "{body:?} should be body text");
        }
    }

    #[test]
    fn heading_aware_example_document() {
        let text = "INTRO\nHello world.\n\nSECTION ONE\nThe cat sat on the mat.";
        let chunks = headings(500, 100).segment(text);
        assert_eq!(
            chunks,
            vec![
                Chunk {
                    heading: Some("INTRO".into()),
                    text: "INTRO\nHello world.".into(),
                    sequence_index: 0,
                },
                Chunk {
                    heading: Some("SECTION ONE".into()),
                    text: "SECTION ONE\nThe cat sat on the mat.".into(),
                    sequence_index: 1,
                },
            ]
        );
        assert_eq!(chunks[1].body(), "The cat sat on the mat.");
    }

    #[test]
    fn text_before_first_heading_uses_root_heading() {
        let chunks = headings(500, 0).segment("A short preface.\nINTRO\nBody text.");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading.as_deref(), Some(ROOT_HEADING));
        assert_eq!(chunks[0].text, "A short preface.");
        assert_eq!(chunks[0].body(), "A short preface.");
        assert_eq!(chunks[1].heading.as_deref(), Some("INTRO"));
    }

    #[test]
    fn every_sub_chunk_inherits_its_section_heading() {
        let risks: String = (0..40)
            .map(|i| format!("Risk number {i} is documented here. "))
            .collect();
        let text = format!("1. Overview\nShort overview.\nRISKS\n{risks}\nSUMMARY\nDone.");
        let chunks = headings(80, 20).segment(&text);

        let risk_chunks: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.heading.as_deref() == Some("RISKS"))
            .collect();
        assert!(risk_chunks.len() > 5);
        for chunk in &risk_chunks {
            assert!(chunk.text.starts_with("RISKS\n"));
            assert!(chunk.body().chars().count() <= 80);
            assert!(chunk.body().contains("Risk number"));
        }

        assert_eq!(chunks[0].heading.as_deref(), Some("1. Overview"));
        assert_eq!(chunks.last().unwrap().heading.as_deref(), Some("SUMMARY"));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, i);
        }
    }

    #[test]
    fn empty_sections_produce_no_chunks() {
        let chunks = headings(100, 0).segment("INTRO\nSECTION ONE\nOnly body.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading.as_deref(), Some("SECTION ONE"));
    }

    #[test]
    fn flat_strategy_leaves_heading_unset() {
        let chunks = flat(500, 100).segment("INTRO\nHello world.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading, None);
        assert_eq!(chunks[0].text, "INTRO\nHello world.");
    }
}

//! Structure-aware text chunker.
//!
//! Splits source text into ordered [`Chunk`]s no larger than a character
//! budget, preferring the coarsest boundary that makes the pieces fit.
//!
//! # Algorithm
//!
//! 1. Split on structural boundaries: markdown headings (`#` .. `######`)
//!    start a new segment, as does any run of two or more blank lines.
//! 2. A segment over budget is split on blank-line paragraph boundaries.
//! 3. A paragraph over budget is split into sentences (`.`, `!`, `?`,
//!    optionally followed by closing quotes/brackets, then whitespace).
//!    Line breaks inside an oversized paragraph also end a sentence.
//! 4. Units are accumulated into a buffer, which is flushed whenever the
//!    next unit would push it over budget. Empty chunks are never emitted.
//!
//! A single sentence longer than the budget is emitted as its own oversized
//! chunk; words are never cut.
//!
//! Units are re-joined with `\n\n` (segments, paragraphs) or a single space
//! (sentences), so concatenating the chunks reproduces the source text up
//! to whitespace at the split points.
//!
//! # Example
//!
//! ```rust
//! use study_forge_core::chunk::split_text;
//!
//! let chunks = split_text("Hello world.\n\nSecond paragraph.", 1_000);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].index, 0);
//! ```

use crate::models::Chunk;

const PARAGRAPH_JOINER: &str = "\n\n";
const SENTENCE_JOINER: &str = " ";

/// Trailing characters absorbed into a sentence after its terminator.
const CLOSERS: &[char] = &['"', '\'', ')', ']', '\u{201d}', '\u{2019}', '\u{bb}'];

struct Unit<'a> {
    text: &'a str,
    chars: usize,
    joiner: &'static str,
}

impl<'a> Unit<'a> {
    fn new(text: &'a str, joiner: &'static str) -> Self {
        Self {
            text,
            chars: text.chars().count(),
            joiner,
        }
    }
}

/// Split `text` into chunks of at most `max_chunk_chars` characters.
///
/// Returns chunks with contiguous indices starting at 0. Blank input yields
/// no chunks. `max_chunk_chars` of 0 is treated as 1.
pub fn split_text(text: &str, max_chunk_chars: usize) -> Vec<Chunk> {
    let max = max_chunk_chars.max(1);

    let mut units = Vec::new();
    for segment in split_blocks(text, 2, true) {
        let seg_chars = segment.chars().count();
        if seg_chars <= max {
            units.push(Unit {
                text: segment,
                chars: seg_chars,
                joiner: PARAGRAPH_JOINER,
            });
            continue;
        }
        for para in split_blocks(segment, 1, false) {
            let para_unit = Unit::new(para, PARAGRAPH_JOINER);
            if para_unit.chars <= max {
                units.push(para_unit);
                continue;
            }
            for (i, sentence) in split_sentences(para).into_iter().enumerate() {
                // The first sentence of a paragraph keeps the paragraph joiner.
                let joiner = if i == 0 { PARAGRAPH_JOINER } else { SENTENCE_JOINER };
                units.push(Unit::new(sentence, joiner));
            }
        }
    }

    accumulate(units, max)
}

/// Pack units greedily into chunks.
fn accumulate(units: Vec<Unit<'_>>, max: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for unit in units {
        let joiner_chars = unit.joiner.len();
        if buf_chars > 0 && buf_chars + joiner_chars + unit.chars > max {
            chunks.push(make_chunk(chunks.len(), &mut buf, buf_chars));
            buf_chars = 0;
        }
        if buf_chars > 0 {
            buf.push_str(unit.joiner);
            buf_chars += joiner_chars;
        }
        buf.push_str(unit.text);
        buf_chars += unit.chars;
    }

    if buf_chars > 0 {
        chunks.push(make_chunk(chunks.len(), &mut buf, buf_chars));
    }

    chunks
}

fn make_chunk(index: usize, buf: &mut String, chars: usize) -> Chunk {
    Chunk {
        index,
        text: std::mem::take(buf),
        char_size: chars,
    }
}

/// Split on runs of at least `min_blank_lines` blank lines, and optionally
/// before every markdown heading line. Returned slices are trimmed and
/// never empty.
fn split_blocks(text: &str, min_blank_lines: usize, break_on_heading: bool) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut start = 0usize;
    let mut offset = 0usize;
    let mut blank_run = 0usize;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
        } else {
            let boundary = blank_run >= min_blank_lines || (break_on_heading && is_heading(trimmed));
            if boundary && offset > start {
                push_trimmed(&mut blocks, &text[start..offset]);
                start = offset;
            }
            blank_run = 0;
        }
        offset += line.len();
    }
    push_trimmed(&mut blocks, &text[start..]);

    blocks
}

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(char::is_whitespace)
}

/// Split a paragraph into sentences. Linear scan, no backtracking.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '.' | '!' | '?' => {
                let mut end = i + c.len_utf8();
                while let Some(&(j, next)) = chars.peek() {
                    if CLOSERS.contains(&next) {
                        end = j + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                match chars.peek() {
                    Some(&(_, next)) if next.is_whitespace() => Some(end),
                    _ => None,
                }
            }
            '\n' => Some(i),
            _ => None,
        };

        if let Some(end) = boundary {
            push_trimmed(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut sentences, &text[start..]);

    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, piece: &'a str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        out.push(trimmed);
    }
}

//! Paragraph packing with trailing-context overlap.

use serde::{Deserialize, Serialize};

/// A retrieval unit cut from the reference document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocChunk {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Upper bound on chunk length, in characters.
    pub max_chars: usize,
    /// Characters of the previous chunk prepended to the next one.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: 1800,
            overlap: 300,
        }
    }
}

/// Split `text` into overlapping chunks.
///
/// Non-empty trimmed lines are paragraphs. Paragraphs are packed greedily
/// into chunks of at most `max_chars`; a single longer paragraph becomes a
/// chunk of its own. Every chunk after the first is prefixed with the last
/// `overlap` characters of the previous (already prefixed) chunk and then cut
/// back to `max_chars`. With `overlap == 0` chunks are only cut back.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let mut packed: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize;

    for para in text.lines().map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = para.chars().count();
        if buf_len + para_len + 1 <= config.max_chars {
            if !buf.is_empty() {
                buf.push('\n');
                buf_len += 1;
            }
            buf.push_str(para);
            buf_len += para_len;
        } else {
            if !buf.is_empty() {
                packed.push(std::mem::take(&mut buf));
            }
            buf.push_str(para);
            buf_len = para_len;
        }
    }
    if !buf.is_empty() {
        packed.push(buf);
    }

    let mut stitched: Vec<String> = Vec::with_capacity(packed.len());
    for chunk in packed {
        let next = match stitched.last() {
            None => chunk,
            Some(_) if config.overlap == 0 => head_chars(&chunk, config.max_chars).to_string(),
            Some(prev) => {
                let joined = format!("{}\n{chunk}", tail_chars(prev, config.overlap));
                head_chars(&joined, config.max_chars).to_string()
            }
        };
        stitched.push(next);
    }
    stitched
}

/// Assign sequential ids `C0, C1, ...`.
pub fn make_chunks(texts: Vec<String>) -> Vec<DocChunk> {
    texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| DocChunk {
            id: format!("C{i}"),
            text,
        })
        .collect()
}

/// Last `n` characters of `s`.
fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let skip = count - n;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}

/// First `n` characters of `s`.
pub(crate) fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(max_chars: usize, overlap: usize) -> ChunkConfig {
        ChunkConfig { max_chars, overlap }
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("", &ChunkConfig::default()).is_empty());
        assert!(chunk_text("\n  \n\t\n", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn short_text_is_one_trimmed_chunk() {
        let text = "  CrySL is a specification language.\nIt describes API usage.  \n";
        let chunks = chunk_text(text, &ChunkConfig::default());
        assert_eq!(chunks, vec![text.trim().to_string()]);
    }

    #[test]
    fn paragraphs_pack_greedily() {
        // "aaaa\nbbbb" is 9 chars; adding "cccc" would need 14 > 12.
        let chunks = chunk_text("aaaa\nbbbb\ncccc", &small(12, 0));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "aaaa\nbbbb");
        assert_eq!(chunks[1], "cccc");
    }

    #[test]
    fn overlap_prefixes_previous_tail() {
        let chunks = chunk_text("aaaa\nbbbb\ncccc", &small(12, 3));
        assert_eq!(chunks[0], "aaaa\nbbbb");
        assert_eq!(chunks[1], "bbb\ncccc");
    }

    #[test]
    fn stitched_chunks_respect_max() {
        let text = (0..40)
            .map(|i| format!("paragraph number {i} with some filler words"))
            .collect::<Vec<_>>()
            .join("\n");
        let config = small(200, 80);
        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= config.max_chars);
        }
        for pair in chunks.windows(2) {
            let tail = tail_chars(&pair[0], 80);
            assert!(pair[1].starts_with(tail));
        }
    }

    #[test]
    fn oversized_paragraph_stands_alone() {
        let long = "x".repeat(30);
        let text = format!("short\n{long}\nend");
        let chunks = chunk_text(&text, &small(10, 0));
        assert_eq!(chunks[0], "short");
        assert_eq!(chunks[1].chars().count(), 10);
        assert_eq!(chunks[2], "end");
    }

    #[test]
    fn multibyte_text_is_sliced_on_char_boundaries() {
        let text = "ÄÖÜäöü€€€€\nßßßßßßßßßß";
        let chunks = chunk_text(text, &small(12, 4));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], "€€€€\nßßßßßßß");
    }

    #[test]
    fn ids_follow_sequence() {
        let chunks = make_chunks(vec!["a".into(), "b".into()]);
        assert_eq!(chunks[0].id, "C0");
        assert_eq!(chunks[1].id, "C1");
        assert_eq!(chunks[1].text, "b");
    }
}

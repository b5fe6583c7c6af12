use serde::Serialize;

/// One bounded block of transcript text handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// 1-based position
    pub index: usize,
    pub total: usize,
    pub content: String,
}

impl Chunk {
    pub fn size(&self) -> usize {
        self.content.chars().count()
    }
}

/// Split `text` into blocks of at most `max_chars` characters.
///
/// Lines are packed first; a line that cannot fit on its own is split on
/// `". "` sentence boundaries. A single sentence longer than the bound becomes
/// its own oversize chunk.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let mut blocks: Vec<String> = Vec::new();
    let mut packer = Packer::new(max_chars, "\n");

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if len(line) <= max_chars {
            if let Some(full) = packer.push(line) {
                blocks.push(full);
            }
            continue;
        }

        blocks.extend(packer.finish());
        let mut sentences = Packer::new(max_chars, " ");
        for sentence in split_sentences(line) {
            if let Some(full) = sentences.push(sentence) {
                blocks.push(full);
            }
        }
        blocks.extend(sentences.finish());
    }
    blocks.extend(packer.finish());

    let total = blocks.len();
    blocks
        .into_iter()
        .enumerate()
        .map(|(i, content)| Chunk {
            index: i + 1,
            total,
            content,
        })
        .collect()
}

/// Accumulates pieces joined by `sep` while the result stays within bounds.
struct Packer {
    max_chars: usize,
    sep: &'static str,
    buf: String,
    buf_len: usize,
}

impl Packer {
    fn new(max_chars: usize, sep: &'static str) -> Self {
        Self {
            max_chars,
            sep,
            buf: String::new(),
            buf_len: 0,
        }
    }

    /// Add a piece; returns the previous buffer if the piece did not fit.
    fn push(&mut self, piece: &str) -> Option<String> {
        let piece_len = len(piece);

        if self.buf.is_empty() {
            self.buf.push_str(piece);
            self.buf_len = piece_len;
            return None;
        }

        if self.buf_len + len(self.sep) + piece_len <= self.max_chars {
            self.buf.push_str(self.sep);
            self.buf.push_str(piece);
            self.buf_len += len(self.sep) + piece_len;
            return None;
        }

        let full = std::mem::replace(&mut self.buf, piece.to_string());
        self.buf_len = piece_len;
        Some(full)
    }

    fn finish(&mut self) -> Option<String> {
        self.buf_len = 0;
        (!self.buf.is_empty()).then(|| std::mem::take(&mut self.buf))
    }
}

fn split_sentences(line: &str) -> impl Iterator<Item = &str> {
    line.split_inclusive(". ").map(str::trim).filter(|s| !s.is_empty())
}

fn len(s: &str) -> usize {
    s.chars().count()
}

//! Sentence segmentation for streamed text.
//!
//! Fragments are emitted verbatim, trailing whitespace included, so the
//! concatenation of everything emitted always equals everything pushed.

/// Accumulates text fragments and releases speakable pieces
#[derive(Debug, Clone)]
pub struct SentenceSegmenter {
    buffer: String,
    max_chars: usize,
}

impl SentenceSegmenter {
    /// `max_chars` is the buffer ceiling that forces a mid-sentence flush
    #[must_use]
    pub fn new(max_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            max_chars,
        }
    }

    /// Text buffered but not yet released
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Append a fragment and return every piece that is ready to speak
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);

        let (complete, rest) = split_sentences(&self.buffer);
        if !complete.is_empty() {
            self.buffer = rest.to_string();
            return complete;
        }

        if self.buffer.chars().count() > self.max_chars {
            if let Some(at) = forced_split_point(&self.buffer) {
                let rest = self.buffer.split_off(at);
                let head = std::mem::replace(&mut self.buffer, rest);
                return vec![head];
            }
        }
        Vec::new()
    }

    /// Release whatever is left; `None` when nothing is buffered
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// Split after every `[.!?]` followed by whitespace; the whitespace run stays
/// with the preceding sentence.
fn split_sentences(text: &str) -> (Vec<String>, &str) {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            let mut end = i + c.len_utf8();
            while let Some(&(j, d)) = chars.peek() {
                if !d.is_whitespace() {
                    break;
                }
                end = j + d.len_utf8();
                chars.next();
            }
            pieces.push(text[start..end].to_string());
            start = end;
            prev = None;
            continue;
        }
        prev = Some(c);
    }

    (pieces, &text[start..])
}

/// Byte offset to split an overlong buffer at: after the last comma, else after
/// the last space. Splits that would release only whitespace are refused.
fn forced_split_point(buffer: &str) -> Option<usize> {
    let at = buffer
        .rfind(',')
        .or_else(|| buffer.rfind(' '))
        .map(|i| i + 1)?;
    (!buffer[..at].trim().is_empty()).then_some(at)
}

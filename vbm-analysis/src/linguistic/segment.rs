//! Sentence segmentation

/// Split text into trimmed sentences
///
/// A sentence ends at a run of `.`, `!` or `?` followed by whitespace or
/// the end of the text; the terminators stay with the sentence. Trailing
/// text without a terminator is its own sentence.
pub fn sentences(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if matches!(next, '.' | '!' | '?') {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let at_boundary = chars.peek().map(|&(_, next)| next.is_whitespace()).unwrap_or(true);
        if at_boundary {
            push_trimmed(&mut result, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut result, &text[start..]);
    result
}

fn push_trimmed(out: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece.to_string());
    }
}

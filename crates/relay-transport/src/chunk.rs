//! Splitting long replies for platforms with message size limits.

/// Split `text` into chunks of at most `max_len` bytes.
///
/// Splits on line boundaries where possible. A single line longer than
/// `max_len` is cut at the last char boundary that fits. Empty input yields
/// no chunks. A `max_len` of zero is treated as one.
#[must_use]
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.len() <= max_len {
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split('\n') {
        let needed = if current.is_empty() { line.len() } else { current.len() + 1 + line.len() };
        if needed <= max_len {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        let mut rest = line;
        while rest.len() > max_len {
            let cut = floor_char_boundary(rest, max_len);
            chunks.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        current.push_str(rest);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    // A multi-byte char wider than the limit still has to go somewhere.
    if i == 0 {
        s.chars().next().map_or(s.len(), char::len_utf8)
    } else {
        i
    }
}

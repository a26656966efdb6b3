//! Text splitting and file helpers

use std::io::ErrorKind;
use std::path::Path;

/// Length of `text` in UTF-16 code units, the unit chat limits are counted in.
#[must_use]
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Byte offset of the first char that no longer fits into `limit` units, or
/// `None` when the whole text fits.
fn overflow_offset(text: &str, limit: usize) -> Option<usize> {
    let mut used = 0;
    text.char_indices().find_map(|(i, c)| {
        used += c.len_utf16();
        (used > limit).then_some(i)
    })
}

/// Splits off the first chunk of `text` that fits into `limit` UTF-16 units.
///
/// The cut is placed at the last whitespace inside the window (the character
/// right after the window counts too). Without any whitespace the text is cut
/// hard at the limit, never inside a character. Whitespace at the cut is
/// consumed.
fn next_chunk(text: &str, limit: usize) -> (&str, &str) {
    let Some(mut window_end) = overflow_offset(text, limit) else {
        return (text, "");
    };
    if window_end == 0 {
        // A single character wider than the limit still has to move forward
        window_end = text.chars().next().map_or(text.len(), char::len_utf8);
    }
    let search_end = text[window_end..]
        .chars()
        .next()
        .map_or(text.len(), |c| window_end + c.len_utf8());

    match text[..search_end].rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => {
            let chunk = text[..pos].trim_end();
            let rest = text[pos..].trim_start();
            if chunk.is_empty() {
                (&text[..window_end], text[window_end..].trim_start())
            } else {
                (chunk, rest)
            }
        }
        _ => (&text[..window_end], text[window_end..].trim_start()),
    }
}

/// Splits `text` into chunks of at most `limit` UTF-16 units.
///
/// Text that already fits is returned as a single chunk equal to the input.
/// Longer text is split greedily on whitespace, so no chunk starts or ends
/// with whitespace and word order is preserved. Empty text yields no chunks.
#[must_use]
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() || limit == 0 {
        return Vec::new();
    }

    if utf16_len(text) <= limit {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        let (chunk, tail) = next_chunk(rest, limit);
        let chunk = chunk.trim_end();
        if !chunk.is_empty() {
            parts.push(chunk.to_string());
        }
        rest = tail;
    }

    parts
}

/// Cuts a caption to `limit` UTF-16 units.
///
/// Returns the caption and, when the text did not fit, the remainder with its
/// leading whitespace removed.
#[must_use]
pub fn split_caption(text: &str, limit: usize) -> (String, Option<String>) {
    if utf16_len(text) <= limit {
        return (text.to_string(), None);
    }

    let (head, tail) = next_chunk(text, limit);
    let leftover = (!tail.is_empty()).then(|| tail.to_string());
    (head.to_string(), leftover)
}

/// Returns the final path component as a lossy string.
#[must_use]
pub fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// Removes a file, treating an already missing file as success.
///
/// Returns `true` when this call removed the file.
///
/// # Errors
///
/// Returns the I/O error for anything other than `NotFound`.
pub async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

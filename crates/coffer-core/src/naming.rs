//! Filename handling: storage-safe key segments and MIME inference.

use crate::defaults::EMPTY_FILENAME_STEM;

/// Longest filename segment kept in a storage key, in bytes.
const MAX_SEGMENT_BYTES: usize = 200;

/// Reduce an uploader-supplied filename to a single safe path segment.
///
/// Directory components are dropped, characters that break object keys or
/// filesystem paths become `_`, and the result is truncated on a character
/// boundary with the extension preserved. Empty names become
/// [`EMPTY_FILENAME_STEM`].
pub fn sanitize_key_segment(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '#' | '%' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return EMPTY_FILENAME_STEM.to_string();
    }

    if sanitized.len() <= MAX_SEGMENT_BYTES {
        return sanitized.to_string();
    }

    let ext = match sanitized.rfind('.') {
        Some(pos) if sanitized.len() - pos <= 16 => &sanitized[pos..],
        _ => "",
    };
    let mut cut = MAX_SEGMENT_BYTES - ext.len();
    while !sanitized.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &sanitized[..cut], ext)
}

/// Best-effort MIME type from the filename extension; empty when unknown.
pub fn infer_mime_type(filename: &str) -> String {
    if !filename.contains('.') {
        return String::new();
    }
    mime_guess::from_path(filename)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_default()
}
